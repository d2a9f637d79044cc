use async_trait::async_trait;

use crate::error::{Result, ServiceError};

/// A text prompt for the music model; never blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPrompt(String);

impl AudioPrompt {
    pub fn new(prompt: impl Into<String>) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "Prompt must not be empty".to_string(),
            ));
        }
        Ok(Self(prompt))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Generates audio for a prompt and returns where it is hosted.
#[async_trait]
pub trait MusicService: Send + Sync {
    async fn generate_audio(&self, prompt: &AudioPrompt) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_keeps_text() {
        let prompt = AudioPrompt::new("uplifting synth melody").unwrap();
        assert_eq!(prompt.as_str(), "uplifting synth melody");
    }

    #[test]
    fn test_blank_prompt_rejected() {
        for blank in ["", "   ", "\n\t"] {
            let err = AudioPrompt::new(blank).unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
    }
}
