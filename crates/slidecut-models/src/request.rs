//! Render request payload.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of slideshow images accepted per request.
pub const MAX_IMAGE_URLS: usize = 50;

/// Request body for the top/bottom template.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderRequest {
    pub variables: TemplateVariables,
}

/// Template inputs: slideshow images on top, source clip on the bottom.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariables {
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub ugc_video_url: String,
}

/// Request shape problems, reported before any directory or network work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("imageUrls array is required and cannot be empty")]
    MissingImages,

    #[error("imageUrls accepts at most {MAX_IMAGE_URLS} entries")]
    TooManyImages,

    #[error("imageUrls[{0}] is empty")]
    EmptyImageUrl(usize),

    #[error("ugcVideoUrl string is required")]
    MissingVideo,
}

impl RenderRequest {
    pub fn new(image_urls: Vec<String>, ugc_video_url: impl Into<String>) -> Self {
        Self {
            variables: TemplateVariables {
                image_urls,
                ugc_video_url: ugc_video_url.into(),
            },
        }
    }

    /// Check the request shape.
    pub fn validate(&self) -> Result<(), RequestError> {
        let vars = &self.variables;
        if vars.image_urls.is_empty() {
            return Err(RequestError::MissingImages);
        }
        if vars.image_urls.len() > MAX_IMAGE_URLS {
            return Err(RequestError::TooManyImages);
        }
        if let Some(index) = vars.image_urls.iter().position(|u| u.trim().is_empty()) {
            return Err(RequestError::EmptyImageUrl(index));
        }
        if vars.ugc_video_url.trim().is_empty() {
            return Err(RequestError::MissingVideo);
        }
        Ok(())
    }
}
