//! Transport: the narrow seam between the retry loop and the network
//!
//! The controller only needs `invoke(endpoint, payload, content_type) ->
//! bytes`. [`HttpTransport`] implements it against an OpenAI-compatible
//! `/chat/completions` route; managed-endpoint SDKs or test stubs can
//! implement [`Transport`] themselves.
//!
//! The `reqwest::Client` behind `HttpTransport` is created once per process
//! on first use and shared by every transport and every call. It holds no
//! per-request state; timeouts and auth headers are set per request.

use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Content type of every payload this crate sends.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Performs the network call to a hosted model endpoint.
///
/// Implementations report every failure (network, non-success status,
/// timeout) as an error; the caller decides whether to retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(&self, endpoint: &str, payload: &[u8], content_type: &str) -> Result<Vec<u8>>;
}

static SHARED_CLIENT: OnceCell<reqwest::Client> = OnceCell::const_new();

/// The process-wide HTTP client, built on first call.
///
/// Concurrent first calls race safely: exactly one initializer runs and
/// everyone gets the same handle.
///
/// Pooled connections belong to the tokio runtime that opened them. Callers
/// that build a fresh runtime per call (`block_on` in a loop) can be handed a
/// connection whose runtime is gone, which fails as a transport error. Keep
/// one long-lived runtime per process when using [`HttpTransport`].
pub async fn shared_http_client() -> Result<&'static reqwest::Client> {
    SHARED_CLIENT
        .get_or_try_init(|| async {
            log::info!("Initializing shared HTTP client...");
            let client = reqwest::Client::builder().build().map_err(Error::Http)?;
            log::info!("HTTP client initialized.");
            Ok(client)
        })
        .await
}

/// HTTP transport posting to `<endpoint>/chat/completions`.
#[derive(Clone, Default)]
pub struct HttpTransport {
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Per-request timeout applied by reqwest itself.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Full URL for an endpoint base.
    pub fn completions_url(endpoint: &str) -> String {
        format!("{}/chat/completions", endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(&self, endpoint: &str, payload: &[u8], content_type: &str) -> Result<Vec<u8>> {
        let client = shared_http_client().await?;
        let url = Self::completions_url(endpoint);

        let mut request = client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(payload.to_vec());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::Http(e)
            }
        })?;

        // Check for HTTP-level errors before reading the body as a completion
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|e| {
                log::warn!("Failed to read error response body: {}", e);
                "Unknown error (failed to read response body)".to_string()
            });
            return Err(Error::api(format!("API error {}: {}", status, body)));
        }

        let body = response.bytes().await.map_err(Error::Http)?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url() {
        assert_eq!(
            HttpTransport::completions_url("http://localhost:8000/v1"),
            "http://localhost:8000/v1/chat/completions"
        );
        assert_eq!(
            HttpTransport::completions_url("http://localhost:8000/v1/"),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_debug_masks_api_key() {
        let transport = HttpTransport::new().with_api_key("secret-token");
        let debug = format!("{:?}", transport);
        assert!(!debug.contains("secret-token"));
    }

    #[tokio::test]
    async fn test_shared_client_is_initialized_once() {
        let handles: Vec<_> = (0..8)
            .map(|_| tokio::spawn(async { shared_http_client().await.map(|c| c as *const _ as usize) }))
            .collect();

        let mut addresses = Vec::new();
        for handle in handles {
            addresses.push(handle.await.unwrap().unwrap());
        }
        addresses.dedup();
        assert_eq!(addresses.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        // Port 9 (discard) is closed on test machines.
        let err = HttpTransport::new()
            .with_timeout(Duration::from_secs(2))
            .invoke("http://127.0.0.1:9/v1", b"{}", JSON_CONTENT_TYPE)
            .await
            .unwrap_err();
        assert_eq!(err.failure_kind(), crate::FailureKind::Transport);
    }
}
