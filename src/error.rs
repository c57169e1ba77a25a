//! Error types for structured vision inference

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image could not be re-encoded for transport
    #[error("Image encoding failed: {0}")]
    Encoding(#[from] image::ImageError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Non-success response from the model endpoint
    #[error("API error: {0}")]
    Api(String),

    /// Failure reported by a transport implementation
    #[error("Transport error: {0}")]
    Transport(String),

    /// Endpoint replied, but not in the chat-completions shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Model output did not satisfy the response schema
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

/// How the retry loop treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network, status, timeout or response-shape failure. Retried with the
    /// transport backoff.
    Transport,
    /// The model replied but its text did not fit the schema. Retried with
    /// the validation backoff.
    Validation,
    /// Caller or programmer error. Propagated immediately.
    Fatal,
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a new malformed response error
    pub fn malformed_response(msg: impl Into<String>) -> Self {
        Error::MalformedResponse(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// Classify this error for the retry loop.
    ///
    /// JSON errors only reach the retry loop while decoding an endpoint
    /// response, so they count as transport failures.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Http(_)
            | Error::Json(_)
            | Error::Api(_)
            | Error::Transport(_)
            | Error::MalformedResponse(_)
            | Error::Timeout => FailureKind::Transport,
            Error::Validation(_) => FailureKind::Validation,
            Error::Encoding(_) | Error::Config(_) | Error::InvalidInput(_) | Error::Other(_) => {
                FailureKind::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("endpoint is required");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(
            err.to_string(),
            "Invalid configuration: endpoint is required"
        );
    }

    #[test]
    fn test_error_api() {
        let err = Error::api("500 Internal Server Error");
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(err.to_string(), "API error: 500 Internal Server Error");
    }

    #[test]
    fn test_error_malformed_response() {
        let err = Error::malformed_response("missing choices");
        assert_eq!(err.to_string(), "Malformed response: missing choices");
    }

    #[test]
    fn test_error_validation() {
        let err = Error::validation("missing field `markdown`");
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation failed: missing field `markdown`"
        );
    }

    #[test]
    fn test_error_timeout() {
        let err = Error::timeout();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.to_string(), "Request timeout");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_failure_kind_classification() {
        assert_eq!(Error::timeout().failure_kind(), FailureKind::Transport);
        assert_eq!(Error::api("503").failure_kind(), FailureKind::Transport);
        assert_eq!(
            Error::transport("connection reset").failure_kind(),
            FailureKind::Transport
        );
        assert_eq!(
            Error::malformed_response("no content").failure_kind(),
            FailureKind::Transport
        );
        assert_eq!(
            Error::validation("bad json").failure_kind(),
            FailureKind::Validation
        );
        assert_eq!(Error::config("x").failure_kind(), FailureKind::Fatal);
        assert_eq!(Error::invalid_input("x").failure_kind(), FailureKind::Fatal);

        let encoding = Error::Encoding(image::ImageError::Limits(
            image::error::LimitError::from_kind(image::error::LimitErrorKind::DimensionError),
        ));
        assert_eq!(encoding.failure_kind(), FailureKind::Fatal);
    }
}
