//! Prompt construction
//!
//! Wraps the caller's prompt and images in the two messages sent on every
//! attempt: a system instruction embedding the schema skeleton, and a user
//! message carrying the prompt text followed by the images in order.
//!
//! Building is deterministic. The same prompt, images and schema always give
//! byte-identical messages, so every retry sends the same payload.

use crate::encoder::{self, EncodedImagePart};
use crate::schema::SchemaDescriptor;
use crate::types::{ChatMessage, ContentPart};
use crate::Result;
use image::DynamicImage;

/// Appended to the caller's prompt text.
pub const USER_REINFORCEMENT: &str = " Respond with ACTUAL CONTENT filling the JSON schema, not the schema itself. The content should be in coherent sentences.";

/// The system and user messages for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessages {
    pub system: ChatMessage,
    pub user: ChatMessage,
}

impl PromptMessages {
    pub fn into_vec(self) -> Vec<ChatMessage> {
        vec![self.system, self.user]
    }
}

/// Render the system instruction for a schema.
pub fn system_instruction(schema: &dyn SchemaDescriptor) -> String {
    format!(
        "You are an expert document analyzer. Follow the instructions given by the user prompt and examine the provided image(s).\n\
         \n\
         Your response must be a single JSON object matching this schema:\n\
         \n\
         {}\n\
         \n\
         IMPORTANT: Do NOT repeat the schema. Instead, POPULATE it with your actual analysis.\n\
         Respond only with the filled JSON object, nothing else. Do not include ```json, ```, or any other formatting.",
        schema.skeleton_pretty()
    )
}

/// Build messages from raw images, encoding each one.
///
/// Encoding failures propagate as [`crate::Error::Encoding`].
pub fn build(
    prompt_text: &str,
    images: &[DynamicImage],
    schema: &dyn SchemaDescriptor,
) -> Result<PromptMessages> {
    let parts = encoder::encode_all(images)?;
    Ok(build_with_parts(prompt_text, &parts, schema))
}

/// Build messages from already encoded images.
pub fn build_with_parts(
    prompt_text: &str,
    images: &[EncodedImagePart],
    schema: &dyn SchemaDescriptor,
) -> PromptMessages {
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(ContentPart::text(format!(
        "{}{}",
        prompt_text, USER_REINFORCEMENT
    )));

    if !images.is_empty() {
        log::debug!("Attaching {} image(s) to user message", images.len());
    }
    for image in images {
        let url = &image.data_uri;
        log::debug!("  - Image: {}", url_display(url));
        parts.push(ContentPart::image_url(url.clone()));
    }

    PromptMessages {
        system: ChatMessage::system(system_instruction(schema)),
        user: ChatMessage::user_with_parts(parts),
    }
}

/// Data URI shortened to its first 100 characters for logging.
fn url_display(url: &str) -> String {
    let char_count = url.chars().count();
    if char_count > 100 {
        let head: String = url.chars().take(100).collect();
        format!("{}... ({} chars)", head, char_count)
    } else {
        url.to_string()
    }
}
