//! Retry controller for the call-validate loop
//!
//! Each attempt either succeeds with a validated value or fails on one of two
//! channels, and each channel has its own linear backoff:
//!
//! | Failure     | Delay after attempt `n` |
//! |-------------|-------------------------|
//! | Transport   | `n * 3s`                |
//! | Validation  | `n * 2s`                |
//!
//! ```text
//! Attempting(0) ──ok──────────────────────────> Success
//!      │
//!      └─fail─> sleep(n * unit) ─> Attempting(n) ... ─> Exhausted (n == max)
//! ```
//!
//! There is no sleep after the final attempt. Exhaustion is not an error: the
//! report carries the last failed outcome and the caller gets the empty
//! sentinel. Only [`FailureKind::Fatal`] errors escape the loop.
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can record requested
//! delays instead of waiting.

use crate::error::FailureKind;
use crate::{Error, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_attempts: u32,

    /// Delay unit per attempt after a transport failure
    pub transport_backoff: Duration,

    /// Delay unit per attempt after a validation failure
    pub validation_backoff: Duration,

    /// Random jitter added to each delay (0.0 to 1.0, default 0.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            transport_backoff: Duration::from_secs(3),
            validation_backoff: Duration::from_secs(2),
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the transport failure delay unit
    pub fn with_transport_backoff(mut self, unit: Duration) -> Self {
        self.transport_backoff = unit;
        self
    }

    /// Set the validation failure delay unit
    pub fn with_validation_backoff(mut self, unit: Duration) -> Self {
        self.validation_backoff = unit;
        self
    }

    /// Set jitter factor (0.0 to 1.0)
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the next attempt, `attempt` being the count of attempts
    /// made so far (1-based).
    pub fn delay_for(&self, kind: FailureKind, attempt: u32) -> Duration {
        let unit = match kind {
            FailureKind::Validation => self.validation_backoff,
            FailureKind::Transport | FailureKind::Fatal => self.transport_backoff,
        };
        let base = unit.saturating_mul(attempt);

        if self.jitter_factor <= 0.0 {
            return base;
        }

        let jitter_range = base.as_millis() as f64 * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        base + Duration::from_millis(jitter as u64)
    }
}

/// Something that can pause the retry loop.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// `n` attempts have been made so far
    Attempting(u32),
    Success,
    Exhausted,
}

/// What a single attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub success: bool,
    pub value: Option<Value>,
    /// Model text, when the endpoint got far enough to return some
    pub raw_text: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub error: Option<String>,
}

impl InvocationOutcome {
    pub fn succeeded(value: Value, raw_text: Option<String>) -> Self {
        Self {
            success: true,
            value: Some(value),
            raw_text,
            error_kind: None,
            error: None,
        }
    }

    pub fn failed(kind: FailureKind, error: &Error, raw_text: Option<String>) -> Self {
        Self {
            success: false,
            value: None,
            raw_text,
            error_kind: Some(kind),
            error: Some(error.to_string()),
        }
    }

    fn not_attempted() -> Self {
        Self {
            success: false,
            value: None,
            raw_text: None,
            error_kind: None,
            error: None,
        }
    }
}

/// Result of one attempt, handed to the controller.
#[derive(Debug)]
pub struct Attempt {
    pub raw_text: Option<String>,
    pub result: Result<Value>,
}

impl Attempt {
    pub fn new(raw_text: Option<String>, result: Result<Value>) -> Self {
        Self { raw_text, result }
    }
}

/// Final report of a retry run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryReport {
    /// `Success` or `Exhausted`
    pub state: RetryState,
    pub attempts: u32,
    /// The successful outcome, or the last failure
    pub outcome: InvocationOutcome,
}

impl RetryReport {
    /// The validated value, or the empty-object sentinel.
    pub fn into_value(self) -> Value {
        match self.outcome.value {
            Some(value) if self.outcome.success => value,
            _ => empty_sentinel(),
        }
    }
}

/// The value returned when every attempt failed: `{}`.
pub fn empty_sentinel() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Drive `attempt` until it succeeds or `config.max_attempts` is reached.
///
/// `attempt` receives the 1-based attempt number. Returns `Err` only for
/// fatal errors; exhaustion is an `Ok` report in the `Exhausted` state.
pub async fn run_with_retries<F, Fut>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut attempt: F,
) -> Result<RetryReport>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt>,
{
    let mut state = RetryState::Attempting(0);
    let mut attempts = 0;
    let mut last = InvocationOutcome::not_attempted();

    loop {
        match state {
            RetryState::Attempting(n) if n >= config.max_attempts => {
                state = RetryState::Exhausted;
            }
            RetryState::Attempting(n) => {
                let tries = n + 1;
                attempts = tries;
                let Attempt { raw_text, result } = attempt(tries).await;

                match result {
                    Ok(value) => {
                        last = InvocationOutcome::succeeded(value, raw_text);
                        state = RetryState::Success;
                    }
                    Err(err) => {
                        let kind = err.failure_kind();
                        if kind == FailureKind::Fatal {
                            return Err(err);
                        }

                        let remaining = tries < config.max_attempts;
                        match kind {
                            FailureKind::Validation => log::warn!(
                                "Failed to validate response (attempt {}/{}): {}",
                                tries,
                                config.max_attempts,
                                err
                            ),
                            _ => log::error!(
                                "Error calling endpoint (attempt {}/{}): {}",
                                tries,
                                config.max_attempts,
                                err
                            ),
                        }

                        last = InvocationOutcome::failed(kind, &err, raw_text);

                        if remaining {
                            let delay = config.delay_for(kind, tries);
                            log::info!("Retrying in {:?}...", delay);
                            sleeper.sleep(delay).await;
                        }
                        state = RetryState::Attempting(tries);
                    }
                }
            }
            RetryState::Success => {
                return Ok(RetryReport {
                    state,
                    attempts,
                    outcome: last,
                });
            }
            RetryState::Exhausted => {
                log::error!(
                    "Giving up after {} attempt(s), returning empty result",
                    config.max_attempts
                );
                return Ok(RetryReport {
                    state,
                    attempts,
                    outcome: last,
                });
            }
        }
    }
}
