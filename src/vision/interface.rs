use async_trait::async_trait;
use base64::Engine as _;

use crate::error::{Result, ServiceError};

/// An uploaded image whose declared content type has already been checked.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    bytes: Vec<u8>,
    content_type: String,
}

impl ImageUpload {
    /// Accepts only non-empty payloads declared as `image/*`.
    pub fn new(bytes: Vec<u8>, content_type: Option<&str>) -> Result<Self> {
        let content_type = check_content_type(content_type)?;

        if bytes.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Uploaded image is empty".to_string(),
            ));
        }

        Ok(Self {
            bytes,
            content_type: content_type.to_string(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// `data:<content_type>;base64,<payload>` with the standard alphabet.
    pub fn to_data_uri(&self) -> String {
        let payload = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.content_type, payload)
    }
}

/// Returns the trimmed content type if it declares an image.
pub fn check_content_type(content_type: Option<&str>) -> Result<&str> {
    content_type
        .map(str::trim)
        .filter(|ct| ct.starts_with("image/"))
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "Invalid file type {:?}. Please upload an image.",
                content_type.unwrap_or("<none>")
            ))
        })
}

/// Turns an image into a short musical description.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Returns one or two sentences describing the music the image evokes.
    /// Never returns an empty string as success.
    async fn describe_image(&self, image: &ImageUpload) -> Result<String>;
}
