//! Normalization of the music provider's output.
//!
//! The prediction `output` has been seen as a bare URL string, an object with
//! an `audio` key, and a file object exposing `url`. All of them collapse to
//! one URL here so nothing downstream probes the shape again.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, ServiceError};

/// Recognized output shapes. Variant order matters for `#[serde(untagged)]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AudioOutput {
    Url(String),
    Keyed { audio: String },
    File { url: String },
}

impl AudioOutput {
    pub fn from_value(value: Value) -> Result<Self> {
        let shown = value.to_string();
        serde_json::from_value(value).map_err(|_| {
            ServiceError::InvalidUpstreamOutput(format!(
                "Unexpected output format from audio generation model: {}",
                shown
            ))
        })
    }

    pub fn into_url(self) -> Result<String> {
        let url = match self {
            AudioOutput::Url(url) => url,
            AudioOutput::Keyed { audio } => audio,
            AudioOutput::File { url } => url,
        };
        if url.trim().is_empty() {
            return Err(ServiceError::InvalidUpstreamOutput(
                "Audio generation model returned an empty URL".to_string(),
            ));
        }
        Ok(url)
    }
}

/// Shorthand for `from_value` followed by `into_url`.
pub fn normalize_output(value: Value) -> Result<String> {
    AudioOutput::from_value(value)?.into_url()
}
