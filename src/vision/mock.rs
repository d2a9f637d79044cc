use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::interface::{ImageUpload, VisionService};
use crate::error::{Result, ServiceError};

type Responder = dyn Fn() -> Result<String> + Send + Sync;

/// In-memory `VisionService` that records how often it was called.
/// Test double for the gateway tests; the server binary never builds one.
pub struct MockVisionClient {
    responder: Box<Responder>,
    call_count: Arc<Mutex<usize>>,
    last_content_type: Arc<Mutex<Option<String>>>,
}

impl MockVisionClient {
    pub fn new() -> Self {
        Self::with_responder(|| Ok("Gentle piano over soft rain.".to_string()))
    }

    pub fn with_description(description: impl Into<String>) -> Self {
        let description = description.into();
        Self::with_responder(move || Ok(description.clone()))
    }

    /// Fails every call with an error built by `make_error`.
    pub fn failing(make_error: impl Fn() -> ServiceError + Send + Sync + 'static) -> Self {
        Self::with_responder(move || Err(make_error()))
    }

    pub fn with_responder(responder: impl Fn() -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            call_count: Arc::new(Mutex::new(0)),
            last_content_type: Arc::new(Mutex::new(None)),
        }
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn last_content_type(&self) -> Option<String> {
        self.last_content_type.lock().unwrap().clone()
    }
}

impl Default for MockVisionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VisionService for MockVisionClient {
    async fn describe_image(&self, image: &ImageUpload) -> Result<String> {
        *self.call_count.lock().unwrap() += 1;
        *self.last_content_type.lock().unwrap() = Some(image.content_type().to_string());
        (self.responder)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts_calls_and_records_content_type() {
        let client = MockVisionClient::with_description("Dark synthwave.");
        assert_eq!(client.get_call_count(), 0);

        let image = ImageUpload::new(vec![1], Some("image/jpeg")).unwrap();
        let text = client.describe_image(&image).await.unwrap();

        assert_eq!(text, "Dark synthwave.");
        assert_eq!(client.get_call_count(), 1);
        assert_eq!(client.last_content_type().as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let client = MockVisionClient::failing(|| ServiceError::EmptyResponse("none".to_string()));
        let image = ImageUpload::new(vec![1], Some("image/png")).unwrap();
        let err = client.describe_image(&image).await.unwrap_err();
        assert!(matches!(err, ServiceError::EmptyResponse(_)));
    }
}
