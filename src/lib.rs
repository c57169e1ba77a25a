//! # vlm-structured
//!
//! Structured inference against hosted vision-language models.
//!
//! ## Overview
//!
//! A document pipeline often needs a model's judgment about an image region:
//! transcribe this block, classify that figure. This crate sends the prompt
//! and images to an OpenAI-compatible chat-completions endpoint and turns the
//! model's free-text reply into a JSON value that satisfies a caller-supplied
//! schema, or into an empty object when the model never gets there.
//!
//! ## Key Features
//!
//! - **Deterministic requests**: images are re-encoded as JPEG data URIs and
//!   the payload is byte-identical across retries
//! - **Schema-guided prompting**: the schema skeleton is embedded in the
//!   system instruction
//! - **Tolerant extraction**: code fences are stripped and raw backslashes
//!   repaired before giving up on a reply
//! - **Differentiated backoff**: `n * 3s` after transport failures, `n * 2s`
//!   after validation failures
//! - **All-or-nothing results**: callers get a complete value or `{}`, never a
//!   partial one
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vlm_structured::{infer, schema, InferenceOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = InferenceOptions::builder()
//!         .endpoint("http://localhost:8000/v1")
//!         .build()?;
//!
//!     let block = image::open("block.png")?;
//!     let transcription = schema()
//!         .title("BlockTranscription")
//!         .field("markdown", "string")
//!         .build();
//!
//!     let value = infer(
//!         "Transcribe the text in this image as markdown.",
//!         &[block],
//!         &transcription,
//!         &options,
//!     )
//!     .await?;
//!
//!     println!("{}", value["markdown"]);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **encoder**: JPEG re-encoding into base64 data URIs
//! - **schema**: the `SchemaDescriptor` capability and field-table schemas
//! - **prompt**: system instruction and user message construction
//! - **extract**: fence stripping, strict parsing and the repair pass
//! - **retry**: the attempt/backoff state machine
//! - **transport**: the network seam and the shared HTTP client
//! - **client**: `VisionClient` and the `infer()` entry point
//! - **types**: request options and chat-completions wire types
//! - **config**: endpoint resolution and base-service defaults
//! - **error**: error enum and failure classification

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Caller-facing client tying prompt building, transport, extraction and retries together.
mod client;

/// Endpoint resolution and base-service defaults, with environment variable support.
mod config;

/// Error types and failure classification for the retry loop.
mod error;

/// Request options and the chat-completions wire format.
mod types;

// ============================================================================
// PUBLIC MODULES
// ============================================================================

pub mod encoder;
pub mod extract;
pub mod prompt;

/// Retry controller. Public so callers can inject a `Sleeper` or drive the
/// state machine around their own attempts.
pub mod retry;

pub mod schema;
pub mod transport;

// --- Client API ---

pub use client::{InferenceRequest, VisionClient, infer};

// --- Configuration ---

pub use config::{DEFAULT_ENDPOINT, ServiceDefaults, get_api_key, get_endpoint, get_model};

// --- Error Handling ---

pub use error::{Error, FailureKind, Result};

// --- Building Blocks ---

pub use encoder::EncodedImagePart;
pub use extract::extract;
pub use prompt::PromptMessages;
pub use retry::{InvocationOutcome, RetryConfig, RetryReport, RetryState, Sleeper, empty_sentinel};
pub use schema::{Field, FieldType, Schema, SchemaBuilder, SchemaDescriptor, TypedSchema, schema};
pub use transport::{HttpTransport, Transport};

// --- Core Types ---

pub use types::{
    ChatCompletionResponse, ChatMessage, ChatRequest, ContentPart, ImageUrl, InferenceOptions,
    InferenceOptionsBuilder, MessageContent, MessageRole,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module containing the most commonly used types and functions.
/// Import with `use vlm_structured::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Error, InferenceOptions, InferenceRequest, Result, Schema, SchemaDescriptor, VisionClient,
        empty_sentinel, infer, schema,
    };
}
