use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::interface::{AudioPrompt, MusicService};
use super::output::normalize_output;
use crate::config::MusicConfig;
use crate::error::{Result, ServiceError};

pub const MODEL_IDENTIFIER: &str = "meta/musicgen";
pub const MODEL_VERSION: &str = "671ac645ce5e552cc63a54a2bbff63fcf798043055d2dac5fc9e36a837eedcfb";

/// MusicGen inputs. Everything except `prompt` is fixed policy.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MusicGenInput {
    pub prompt: String,
    pub top_k: u32,
    pub top_p: f32,
    pub duration: u32,
    pub temperature: f32,
    pub continuation: bool,
    pub continuation_start: u32,
    pub model_version: &'static str,
    pub output_format: &'static str,
    pub multi_band_diffusion: bool,
    pub normalization_strategy: &'static str,
    pub classifier_free_guidance: u32,
}

impl MusicGenInput {
    pub fn fixed(prompt: &AudioPrompt) -> Self {
        Self {
            prompt: prompt.as_str().to_string(),
            top_k: 150,
            top_p: 0.0,
            duration: 8,
            temperature: 1.0,
            continuation: false,
            continuation_start: 0,
            model_version: "stereo-melody-large",
            output_format: "wav",
            multi_band_diffusion: false,
            normalization_strategy: "loudness",
            classifier_free_guidance: 3,
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: MusicGenInput,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
    #[serde(default)]
    cancel: Option<String>,
}

impl Prediction {
    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("<unknown>")
    }

    fn is_final(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

/// Music adapter backed by the Replicate predictions API.
///
/// The prediction is created with `Prefer: wait`. If it is still running when
/// that window closes, its `urls.get` is followed until it settles or
/// `timeout_secs` runs out, in which case it is canceled.
pub struct ReplicateMusicClient {
    client: Client,
    api_token: String,
    base_url: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl ReplicateMusicClient {
    pub fn new(config: &MusicConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            "Initialized ReplicateMusicClient: model={}:{}, base_url={}",
            MODEL_IDENTIFIER, MODEL_VERSION, config.base_url
        );

        Ok(Self {
            client,
            api_token: config.api_token.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    async fn create_prediction(&self, input: MusicGenInput) -> Result<Prediction> {
        let url = format!("{}/v1/predictions", self.base_url);
        let request = PredictionRequest {
            version: MODEL_VERSION,
            input,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send request to Replicate: {}", e);
                ServiceError::Internal(format!("Failed to generate audio via Replicate: {}", e))
            })?;

        read_prediction(response).await
    }

    async fn fetch_prediction(&self, url: &str) -> Result<Prediction> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to poll Replicate prediction: {}", e);
                ServiceError::Internal(format!("Failed to poll Replicate prediction: {}", e))
            })?;

        read_prediction(response).await
    }

    async fn cancel_prediction(&self, prediction: &Prediction) {
        let Some(url) = prediction.urls.as_ref().and_then(|u| u.cancel.as_deref()) else {
            warn!("Prediction {} has no cancel URL", prediction.id());
            return;
        };

        match self.client.post(url).bearer_auth(&self.api_token).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Canceled Replicate prediction {}", prediction.id());
            }
            Ok(response) => warn!(
                "Canceling prediction {} returned status {}",
                prediction.id(),
                response.status()
            ),
            Err(e) => warn!("Failed to cancel prediction {}: {}", prediction.id(), e),
        }
    }

    /// Follows a running prediction until it is final, bounded by the timeout
    /// measured from `started`.
    async fn wait_until_final(
        &self,
        mut prediction: Prediction,
        started: Instant,
    ) -> Result<Prediction> {
        let deadline = started + self.timeout;

        while !prediction.is_final() {
            let Some(get_url) = prediction.urls.as_ref().and_then(|u| u.get.clone()) else {
                return Err(ServiceError::Upstream(format!(
                    "Prediction {} is {} and has no status URL",
                    prediction.id(),
                    prediction.status
                )));
            };

            if Instant::now() + self.poll_interval > deadline {
                self.cancel_prediction(&prediction).await;
                return Err(ServiceError::Upstream(format!(
                    "Prediction {} still {} after {}s",
                    prediction.id(),
                    prediction.status,
                    self.timeout.as_secs()
                )));
            }

            sleep(self.poll_interval).await;
            prediction = self.fetch_prediction(&get_url).await?;
            debug!("Replicate prediction {} status: {}", prediction.id(), prediction.status);
        }

        Ok(prediction)
    }
}

async fn read_prediction(response: reqwest::Response) -> Result<Prediction> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.map_err(|e| {
            error!("Replicate API error (status {}), body unreadable: {}", status, e);
            ServiceError::Upstream(format!(
                "Audio generation service error (status {}), failed to read body: {}",
                status, e
            ))
        })?;
        error!("Replicate API error (status {}): {}", status, body);
        return Err(ServiceError::Upstream(format!(
            "Audio generation service error (status {}): {}",
            status, body
        )));
    }

    response.json().await.map_err(|e| {
        error!("Failed to parse Replicate response: {}", e);
        ServiceError::Internal(format!("Failed to parse Replicate response: {}", e))
    })
}

/// Maps a final prediction to its output value or the provider's failure.
fn settle(prediction: Prediction) -> Result<Value> {
    let id = prediction.id().to_string();
    match prediction.status.as_str() {
        "succeeded" => prediction.output.ok_or_else(|| {
            ServiceError::InvalidUpstreamOutput(format!(
                "Prediction {} succeeded without output",
                id
            ))
        }),
        "failed" | "canceled" => {
            let reason = prediction
                .error
                .map(|e| match e {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "no error message".to_string());
            Err(ServiceError::Upstream(format!(
                "Prediction {} {}: {}",
                id, prediction.status, reason
            )))
        }
        other => Err(ServiceError::Upstream(format!(
            "Prediction {} ended in unexpected status {}",
            id, other
        ))),
    }
}

#[async_trait]
impl MusicService for ReplicateMusicClient {
    async fn generate_audio(&self, prompt: &AudioPrompt) -> Result<String> {
        if self.api_token.trim().is_empty() {
            return Err(ServiceError::ServiceUnavailable(
                "Replicate API token not configured.".to_string(),
            ));
        }

        info!(
            "Running Replicate model {} with prompt: {}",
            MODEL_IDENTIFIER,
            prompt.as_str()
        );

        let started = Instant::now();
        let prediction = self.create_prediction(MusicGenInput::fixed(prompt)).await?;
        debug!("Replicate prediction {} status: {}", prediction.id(), prediction.status);

        let prediction = self.wait_until_final(prediction, started).await?;
        let output = settle(prediction)?;
        debug!("Replicate output: {}", output);
        normalize_output(output)
    }
}
