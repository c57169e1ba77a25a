//! Client for structured inference against a vision-language endpoint
//!
//! This module ties the pieces together for a single call:
//!
//! ```text
//! caller ─> prompt::build (encoder) ─> run_with_retries ─┬─> Transport::invoke
//!                                                        ├─> choices[0].message.content
//!                                                        └─> extract (schema)
//!        <─ validated value, or {} after the last attempt
//! ```
//!
//! ## Call Semantics
//!
//! - Images are encoded and the payload serialized once, before the first
//!   attempt. Every attempt sends the same bytes.
//! - Each attempt is bounded by the request timeout. An elapsed timeout is a
//!   transport failure and consumes an attempt.
//! - Transport failures back off `n * 3s`, validation failures `n * 2s`.
//! - When the attempts run out the call returns `{}` rather than an error.
//!   The only errors a caller sees are fatal ones: an image that can't be
//!   encoded, or an invalid request.
//!
//! ## Concurrency
//!
//! A `VisionClient` is `Send + Sync` and holds no per-call state, so one
//! instance can serve many concurrent calls. Attempts within a call are
//! strictly sequential.
//!
//! # Examples
//!
//! ```rust,no_run
//! use vlm_structured::{schema, InferenceOptions, VisionClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = InferenceOptions::builder()
//!     .endpoint("http://localhost:8000/v1")
//!     .model("Qwen2.5-VL-72B-Instruct")
//!     .build()?;
//! let client = VisionClient::new(options);
//!
//! let page = image::open("page.png")?;
//! let transcription = schema().field("markdown", "string").build();
//!
//! let value = client
//!     .infer("Transcribe the text in this image.", &[page], &transcription)
//!     .await?;
//! if value.as_object().is_some_and(|o| o.is_empty()) {
//!     println!("model never produced a valid answer");
//! }
//! # Ok(())
//! # }
//! ```

use crate::extract::extract;
use crate::prompt;
use crate::retry::{Attempt, RetryConfig, RetryReport, Sleeper, TokioSleeper, run_with_retries};
use crate::schema::SchemaDescriptor;
use crate::transport::{HttpTransport, JSON_CONTENT_TYPE, Transport};
use crate::types::{ChatCompletionResponse, ChatRequest, InferenceOptions};
use crate::{Error, FailureKind, Result};
use image::DynamicImage;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Characters of the serialized payload shown in debug logs.
const PAYLOAD_PREVIEW_CHARS: usize = 500;

/// One structured-inference call.
///
/// Borrows the caller's images and schema; nothing is mutated.
#[derive(Clone, Copy)]
pub struct InferenceRequest<'a> {
    prompt_text: &'a str,
    images: &'a [DynamicImage],
    schema: &'a dyn SchemaDescriptor,
    max_retries: Option<u32>,
    timeout: Option<u64>,
}

impl<'a> InferenceRequest<'a> {
    pub fn new(
        prompt_text: &'a str,
        images: &'a [DynamicImage],
        schema: &'a dyn SchemaDescriptor,
    ) -> Self {
        Self {
            prompt_text,
            images,
            schema,
            max_retries: None,
            timeout: None,
        }
    }

    /// Override the client's default attempt count for this call.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Override the client's default per-attempt timeout, in seconds.
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }
}

impl std::fmt::Debug for InferenceRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceRequest")
            .field("prompt_text", &self.prompt_text)
            .field("images", &format!("{} image(s)", self.images.len()))
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Structured-inference client for one endpoint.
#[derive(Clone)]
pub struct VisionClient {
    options: InferenceOptions,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryConfig,
}

impl std::fmt::Debug for VisionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionClient")
            .field("options", &self.options)
            .field("retry", &self.retry)
            .finish()
    }
}

impl VisionClient {
    /// Client using [`HttpTransport`] and real sleeps.
    ///
    /// The transport carries no timeout of its own; each attempt is bounded
    /// by the request's timeout in [`infer_with_outcome`](Self::infer_with_outcome).
    pub fn new(options: InferenceOptions) -> Self {
        let mut transport = HttpTransport::new();
        if let Some(key) = &options.api_key {
            transport = transport.with_api_key(key.clone());
        }
        Self::with_transport(options, Arc::new(transport))
    }

    /// Client using a custom transport.
    pub fn with_transport(options: InferenceOptions, transport: Arc<dyn Transport>) -> Self {
        Self {
            options,
            transport,
            sleeper: Arc::new(TokioSleeper),
            retry: RetryConfig::default(),
        }
    }

    /// Replace how backoff delays are waited out.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace backoff units and jitter. `max_attempts` is ignored; attempts
    /// come from the request or [`InferenceOptions::max_retries`].
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn options(&self) -> &InferenceOptions {
        &self.options
    }

    /// Run a call with default retries and timeout.
    ///
    /// Returns the validated value, or `{}` when every attempt failed.
    pub async fn infer(
        &self,
        prompt_text: &str,
        images: &[DynamicImage],
        schema: &dyn SchemaDescriptor,
    ) -> Result<Value> {
        self.infer_request(InferenceRequest::new(prompt_text, images, schema))
            .await
    }

    /// Run a fully specified call.
    pub async fn infer_request(&self, request: InferenceRequest<'_>) -> Result<Value> {
        Ok(self.infer_with_outcome(request).await?.into_value())
    }

    /// Run a call and report how it ended.
    ///
    /// `Err` is reserved for fatal errors. Endpoint and model failures end in
    /// a report whose state is `Exhausted`.
    pub async fn infer_with_outcome(&self, request: InferenceRequest<'_>) -> Result<RetryReport> {
        let max_retries = request.max_retries.unwrap_or(self.options.max_retries);
        let timeout_secs = request.timeout.unwrap_or(self.options.timeout);
        if timeout_secs == 0 {
            return Err(Error::invalid_input("timeout must be greater than zero"));
        }
        let timeout = Duration::from_secs(timeout_secs);

        let messages = prompt::build(request.prompt_text, request.images, request.schema)?;
        let payload = serde_json::to_vec(&ChatRequest {
            model: self.options.model.clone(),
            messages: messages.into_vec(),
            max_tokens: self.options.max_tokens,
        })?;
        log_payload_preview(&payload);

        let config = self.retry.clone().with_max_attempts(max_retries);
        let endpoint = self.options.endpoint.as_str();
        let transport = self.transport.as_ref();
        let schema = request.schema;
        let payload = payload.as_slice();

        run_with_retries(&config, self.sleeper.as_ref(), move |n| async move {
            log::info!(
                "Sending request to {} (attempt {}/{})",
                endpoint,
                n,
                max_retries
            );
            attempt_once(transport, endpoint, payload, timeout, schema).await
        })
        .await
    }
}

/// One transport call plus extraction.
async fn attempt_once(
    transport: &dyn Transport,
    endpoint: &str,
    payload: &[u8],
    timeout: Duration,
    schema: &dyn SchemaDescriptor,
) -> Attempt {
    let body = match tokio::time::timeout(
        timeout,
        transport.invoke(endpoint, payload, JSON_CONTENT_TYPE),
    )
    .await
    {
        Err(_) => return Attempt::new(None, Err(Error::timeout())),
        Ok(Err(e)) => return Attempt::new(None, Err(as_transport_error(e))),
        Ok(Ok(body)) => body,
    };

    let text = match ChatCompletionResponse::content_from_bytes(&body) {
        Ok(text) => text,
        Err(e) => return Attempt::new(None, Err(e)),
    };

    let result = extract(&text, schema);
    Attempt::new(Some(text), result)
}

/// Whatever a transport raises is a transport failure.
fn as_transport_error(err: Error) -> Error {
    match err.failure_kind() {
        FailureKind::Transport => err,
        FailureKind::Validation | FailureKind::Fatal => Error::transport(err.to_string()),
    }
}

fn log_payload_preview(payload: &[u8]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let text = String::from_utf8_lossy(payload);
    let preview: String = text.chars().take(PAYLOAD_PREVIEW_CHARS).collect();
    log::debug!(
        "Payload ({} bytes): {}...",
        payload.len(),
        preview
    );
}

/// Single call over HTTP with the given options.
///
/// Convenience wrapper around [`VisionClient::infer`].
pub async fn infer(
    prompt_text: &str,
    images: &[DynamicImage],
    schema: &dyn SchemaDescriptor,
    options: &InferenceOptions,
) -> Result<Value> {
    VisionClient::new(options.clone())
        .infer(prompt_text, images, schema)
        .await
}
