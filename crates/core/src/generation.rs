//! Generation request shape, validation, and output descriptor.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum prompt length in characters.
pub const MAX_PROMPT_LEN: usize = 4000;

/// Maximum number of images a single request may produce.
pub const MAX_BATCH_SIZE: u32 = 4;

/// Aspect ratios every provider adapter knows how to map to dimensions.
pub const SUPPORTED_ASPECT_RATIOS: &[&str] = &["1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3"];

/// Style value meaning "no style".
pub const STYLE_NONE: &str = "none";

fn default_batch_size() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A caller's request to generate output with one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Registered provider name, e.g. `"flux"`.
    pub provider: String,
    /// Model id used for pricing; defaults to the provider name.
    #[serde(default)]
    pub model: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// Base64 data URL or remote URL of an input image (image-to-image).
    #[serde(default)]
    pub input_image: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Explicit queue priority for async mode.
    #[serde(default)]
    pub priority: Option<i32>,
}

impl GenerationRequest {
    /// A text-only request with defaults for every optional field.
    pub fn new(provider: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: None,
            prompt: prompt.into(),
            style: None,
            aspect_ratio: None,
            input_image: None,
            batch_size: default_batch_size(),
            priority: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(aspect_ratio.into());
        self
    }

    pub fn with_input_image(mut self, image: impl Into<String>) -> Self {
        self.input_image = Some(image.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Model id used for pricing and records.
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.provider)
    }

    /// Style with `"none"` and blank values treated as absent.
    pub fn effective_style(&self) -> Option<&str> {
        self.style
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(STYLE_NONE))
    }

    /// `true` when the request carries an input image. Such requests are
    /// never served from or written to the result cache.
    pub fn has_input_image(&self) -> bool {
        self.input_image
            .as_deref()
            .is_some_and(|img| !img.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate the request shape. Runs before any side effect.
///
/// Rules:
/// - `provider` must not be blank.
/// - `prompt` must not be blank and must not exceed `MAX_PROMPT_LEN` characters.
/// - `batch_size` must be in `1..=MAX_BATCH_SIZE`.
/// - `aspect_ratio`, when present, must be one of `SUPPORTED_ASPECT_RATIOS`.
pub fn validate_request(request: &GenerationRequest) -> Result<(), CoreError> {
    if request.provider.trim().is_empty() {
        return Err(CoreError::Validation("Provider is required".to_string()));
    }
    if request.prompt.trim().is_empty() {
        return Err(CoreError::Validation("Prompt is required".to_string()));
    }
    if request.prompt.chars().count() > MAX_PROMPT_LEN {
        return Err(CoreError::Validation(format!(
            "Prompt must not exceed {MAX_PROMPT_LEN} characters"
        )));
    }
    if request.batch_size == 0 || request.batch_size > MAX_BATCH_SIZE {
        return Err(CoreError::Validation(format!(
            "Batch size must be between 1 and {MAX_BATCH_SIZE}"
        )));
    }
    if let Some(ratio) = request.aspect_ratio.as_deref() {
        if !SUPPORTED_ASPECT_RATIOS.contains(&ratio) {
            return Err(CoreError::Validation(format!(
                "Unsupported aspect ratio: {ratio}"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Provider-agnostic description of a finished output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub model: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
