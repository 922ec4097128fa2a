use std::path::Path;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Menu;
use crate::upload::ImageKind;

// ── Prompts ──────────────────────────────────────────────────────────────────

pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are an AI agent expert in reading and interpreting restaurant menus.";

pub const EXTRACTION_INSTRUCTION: &str =
    "Report the whole menu in the established output format.";

pub fn dish_image_prompt(name: &str, description: &str) -> String {
    format!(
        "You are an AI assistant expert in creating professional, appealing pictures of restaurant dishes.\n\
         You always create pictures of the product described by the user without any text overlaid on the picture.\n\
         \n\
         Create the picture of the following product:\n\
         <product>\n\
         {}\n\
         {}\n\
         </product>",
        name, description
    )
}

// ── Lazy static regexes ──────────────────────────────────────────────────────

static IMAGE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://[^\s)]+(?:\.(?:png|jpg|jpeg|gif|webp)|[^\s)]*)").unwrap()
});

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").unwrap());

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("model endpoint returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("model output is not a valid menu: {0}")]
    InvalidMenu(String),
    #[error("failed to read menu image: {0}")]
    Image(#[from] std::io::Error),
}

// ── Collaborators ────────────────────────────────────────────────────────────

/// Structured-output model call that reads a menu photo.
#[async_trait]
pub trait MenuExtractor: Send + Sync {
    async fn extract_menu(&self, image: &Path, kind: ImageKind) -> Result<Menu, AiError>;
}

/// Image-generation call for a single dish. Returns the image URL, or an
/// empty string when the model answered without one.
#[async_trait]
pub trait DishImageGenerator: Send + Sync {
    async fn generate_dish_image(&self, name: &str, description: &str) -> Result<String, AiError>;
}

// ── Response parsing ─────────────────────────────────────────────────────────

/// First `http(s)://` URL in free-form model text, stopping at whitespace or
/// a closing parenthesis so markdown image links yield the bare URL.
pub fn extract_image_url(text: &str) -> String {
    IMAGE_URL_RE
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Parse structured-output text into a [`Menu`], tolerating a markdown code
/// fence around the JSON. Negative prices are rejected.
pub fn parse_menu(text: &str) -> Result<Menu, AiError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AiError::EmptyResponse);
    }
    let json = CODE_FENCE_RE
        .captures(trimmed)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);
    let menu: Menu =
        serde_json::from_str(json).map_err(|e| AiError::InvalidMenu(e.to_string()))?;
    if let Some(problem) = menu.negative_price() {
        return Err(AiError::InvalidMenu(problem));
    }
    Ok(menu)
}
