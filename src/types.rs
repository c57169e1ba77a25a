//! Core types: request options and the chat-completions wire format

use crate::config::ServiceDefaults;
use serde::{Deserialize, Serialize};

/// Options for talking to a hosted vision-language endpoint
#[derive(Clone)]
pub struct InferenceOptions {
    /// Endpoint base URL (e.g. "http://localhost:8000/v1")
    pub endpoint: String,

    /// Model name, sent only when set
    pub model: Option<String>,

    /// Bearer token forwarded as-is (most self-hosted endpoints don't need this)
    pub api_key: Option<String>,

    /// Maximum tokens to generate (None uses endpoint default)
    pub max_tokens: Option<u32>,

    /// Attempts per call when the request doesn't override it
    pub max_retries: u32,

    /// Per-attempt timeout in seconds when the request doesn't override it
    pub timeout: u64,
}

impl std::fmt::Debug for InferenceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceOptions")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl InferenceOptions {
    /// Create a new builder for InferenceOptions
    pub fn builder() -> InferenceOptionsBuilder {
        InferenceOptionsBuilder::default()
    }
}

/// Builder for InferenceOptions
#[derive(Debug, Default)]
pub struct InferenceOptionsBuilder {
    endpoint: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    max_tokens: Option<Option<u32>>,
    max_retries: Option<u32>,
    timeout: Option<u64>,
    defaults: Option<ServiceDefaults>,
}

impl InferenceOptionsBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(Some(tokens));
        self
    }

    /// Leave `max_tokens` out of the payload entirely.
    pub fn no_max_tokens(mut self) -> Self {
        self.max_tokens = Some(None);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Base defaults for anything not set explicitly.
    pub fn defaults(mut self, defaults: ServiceDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn build(self) -> crate::Result<InferenceOptions> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| crate::Error::config("endpoint is required"))?;
        let endpoint = endpoint.trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(crate::Error::config("endpoint must not be empty"));
        }

        let defaults = self.defaults.unwrap_or_default();
        let timeout = self.timeout.unwrap_or(defaults.timeout_secs);
        if timeout == 0 {
            return Err(crate::Error::config("timeout must be greater than zero"));
        }

        Ok(InferenceOptions {
            endpoint,
            model: self.model,
            api_key: self.api_key,
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            timeout,
        })
    }
}

/// Message role in the request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// Message content: plain text or an ordered list of parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multimodal user message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

/// Image reference, here always a `data:` URI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageUrl {
    pub url: String,
}

/// A message in the request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(parts),
        }
    }
}

/// Chat-completions request payload
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Chat-completions response, only the fields we read
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Decode a response body and pull out `choices[0].message.content`.
    ///
    /// Any deviation from that shape is a [`crate::Error::MalformedResponse`].
    pub fn content_from_bytes(body: &[u8]) -> crate::Result<String> {
        let response: ChatCompletionResponse = serde_json::from_slice(body)
            .map_err(|e| crate::Error::malformed_response(format!("invalid body: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| crate::Error::malformed_response("response has no choices"))?
            .message
            .content
            .ok_or_else(|| crate::Error::malformed_response("first choice has no content"))
    }
}
