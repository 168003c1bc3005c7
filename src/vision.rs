//! Vision collaborator boundary: cropped page image → descriptive text.
//!
//! Thin on purpose: the instruction template lives in [`crate::prompts`],
//! geometry and rendering live elsewhere; this module only encodes the image
//! and drives one chat call. The reply is treated as untrusted free text: no
//! schema is enforced on it, the operator reviews it before commit.
//!
//! Any provider failure (timeout, throttle, malformed reply) is caught here
//! and surfaced as a [`PageError`] so one bad page never aborts a batch.

use crate::config::CurationConfig;
use crate::error::PageError;
use crate::prompts::VISION_INSTRUCTIONS;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Encode a cropped page as a base64 PNG attachment.
///
/// PNG over JPEG: lossless compression keeps rendered text crisp, which is
/// what the vision model reads. `detail: "high"` lets tiling models use
/// their full resolution budget on fine print.
pub fn encode_crop(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded crop → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Convert one cropped page image to descriptive text via the vision model.
///
/// One attempt, no internal retry: in the interactive loop the operator owns
/// the retry decision, and the unattended batch logs the failure and moves
/// to the next page.
pub async fn describe_page(
    provider: &Arc<dyn LLMProvider>,
    page: usize,
    image: &DynamicImage,
    config: &CurationConfig,
) -> Result<String, PageError> {
    let image_data = encode_crop(image).map_err(|e| PageError::Render {
        page,
        detail: format!("image encoding failed: {e}"),
    })?;

    let instructions = config
        .vision_instructions
        .as_deref()
        .unwrap_or(VISION_INSTRUCTIONS);

    // The image carries the content; the empty user text satisfies APIs
    // that require a user turn.
    let messages = vec![
        ChatMessage::system(instructions),
        ChatMessage::user_with_images("", vec![image_data]),
    ];

    let options = CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    };

    let response = provider
        .chat(&messages, Some(&options))
        .await
        .map_err(|e| PageError::Vision {
            page,
            detail: e.to_string(),
        })?;

    debug!(
        "Page {}: vision reply {} chars ({} in / {} out tokens)",
        page,
        response.content.len(),
        response.prompt_tokens,
        response.completion_tokens
    );

    Ok(response.content)
}
