use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use super::interface::{ImageUpload, VisionService};
use crate::config::VisionConfig;
use crate::error::{Result, ServiceError};

const DEVELOPER_PROMPT: &str = "You sit between a user and a generative music model. \
You will receive an image. Describe it from a musical perspective so the description \
can be sent to the music model as its prompt: take the vibe, colors, genre and feeling \
of the picture into account and say what kind of music or sound it evokes (mood, \
rhythm, instrumentation, genre). Use at most 2 sentences. Answer with a JSON object \
whose only key is \"text\".";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    reasoning_effort: &'static str,
    store: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<MessagePart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagePart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// The JSON object the model is instructed to answer with.
#[derive(Debug, Deserialize)]
struct MusicalDescription {
    text: String,
}

/// Vision adapter backed by OpenAI chat completions.
pub struct OpenAIVisionClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIVisionClient {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            "Initialized OpenAIVisionClient: model={}, base_url={}",
            config.model, config.base_url
        );

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn build_request(&self, image: &ImageUpload) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "developer",
                    content: vec![MessagePart::Text {
                        text: DEVELOPER_PROMPT.to_string(),
                    }],
                },
                ChatMessage {
                    role: "user",
                    content: vec![MessagePart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.to_data_uri(),
                        },
                    }],
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            reasoning_effort: "low",
            store: false,
        }
    }

    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send request to OpenAI: {}", e);
                ServiceError::Upstream(format!("Failed to reach OpenAI: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ServiceError::Upstream(format!("Failed to read OpenAI response: {}", e))
        })?;

        if !status.is_success() {
            error!("OpenAI API error (status {}): {}", status, body);
            return Err(ServiceError::Upstream(format!(
                "OpenAI API error (status {}): {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse OpenAI response: {}\nBody: {}", e, body);
            ServiceError::Upstream(format!("Failed to parse OpenAI response: {}", e))
        })
    }
}

/// Unwraps the `{"text": ...}` answer, rejecting blank or misshapen content.
fn extract_description(content: Option<String>) -> Result<String> {
    let content = content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| {
            ServiceError::EmptyResponse("OpenAI returned an empty description".to_string())
        })?;

    let parsed: MusicalDescription = serde_json::from_str(&content).map_err(|e| {
        ServiceError::InvalidUpstreamOutput(format!(
            "Expected a JSON object with a \"text\" key, got {:?}: {}",
            content, e
        ))
    })?;

    let text = parsed.text.trim();
    if text.is_empty() {
        return Err(ServiceError::EmptyResponse(
            "OpenAI returned an empty description".to_string(),
        ));
    }
    Ok(text.to_string())
}

#[async_trait]
impl VisionService for OpenAIVisionClient {
    async fn describe_image(&self, image: &ImageUpload) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(ServiceError::ServiceUnavailable(
                "OpenAI client not initialized. Check API key.".to_string(),
            ));
        }

        debug!(
            "Sending {} byte {} image to OpenAI model {}",
            image.bytes().len(),
            image.content_type(),
            self.model
        );

        let request = self.build_request(image);
        let response = self.chat_completion(&request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);

        extract_description(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: &str) -> OpenAIVisionClient {
        let config = VisionConfig {
            api_key: api_key.to_string(),
            base_url: server.uri(),
            ..VisionConfig::default()
        };
        OpenAIVisionClient::new(&config).unwrap()
    }

    fn png() -> ImageUpload {
        ImageUpload::new(vec![0x89, 0x50, 0x4E, 0x47], Some("image/png")).unwrap()
    }

    fn completion(content: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        }))
    }

    #[tokio::test]
    async fn test_describe_image_unwraps_text_key() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(completion(serde_json::json!(
                "{\"text\": \"Warm ambient pads with a slow 70 BPM pulse.\"}"
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "test-key");
        let description = client.describe_image(&png()).await.unwrap();
        assert_eq!(description, "Warm ambient pads with a slow 70 BPM pulse.");
    }

    #[tokio::test]
    async fn test_describe_image_sends_data_uri_and_fixed_options() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "o4-mini",
                "response_format": { "type": "json_object" },
                "reasoning_effort": "low",
                "store": false,
                "messages": [
                    { "role": "developer" },
                    {
                        "role": "user",
                        "content": [{
                            "type": "image_url",
                            "image_url": { "url": "data:image/png;base64,iVBORw==" }
                        }]
                    }
                ]
            })))
            .respond_with(completion(serde_json::json!("{\"text\": \"Lo-fi beats.\"}")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "key");
        assert_eq!(client.describe_image(&png()).await.unwrap(), "Lo-fi beats.");
    }

    #[tokio::test]
    async fn test_null_content_is_empty_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(completion(serde_json::Value::Null))
            .mount(&server)
            .await;

        let err = client_for(&server, "key").describe_image(&png()).await.unwrap_err();
        assert!(matches!(err, ServiceError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn test_no_choices_is_empty_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, "key").describe_image(&png()).await.unwrap_err();
        assert!(matches!(err, ServiceError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn test_non_json_content_is_invalid_output() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(completion(serde_json::json!("Just some jazz.")))
            .mount(&server)
            .await;

        let err = client_for(&server, "key").describe_image(&png()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidUpstreamOutput(_)));
    }

    #[tokio::test]
    async fn test_api_error_is_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client_for(&server, "key").describe_image(&png()).await.unwrap_err();
        match err {
            ServiceError::Upstream(msg) => assert!(msg.contains("rate limited")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_rejects_without_calling_provider() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server, "").describe_image(&png()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ServiceUnavailable(_)));
    }

    #[test]
    fn test_extract_description_rejects_blank_text() {
        let err = extract_description(Some("{\"text\": \"   \"}".to_string())).unwrap_err();
        assert!(matches!(err, ServiceError::EmptyResponse(_)));
    }
}
