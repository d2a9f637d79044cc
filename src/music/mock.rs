use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use super::interface::{AudioPrompt, MusicService};
use super::output::normalize_output;
use crate::error::{Result, ServiceError};

type Responder = dyn Fn() -> Result<Value> + Send + Sync;

/// In-memory `MusicService`. Responds with a raw provider output value that
/// goes through the same normalization as the real client.
/// Test double for the gateway tests; the server binary never builds one.
pub struct MockMusicClient {
    responder: Box<Responder>,
    call_count: Arc<Mutex<usize>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockMusicClient {
    pub fn new() -> Self {
        Self::with_output(Value::String("https://cdn.example.com/mock.wav".to_string()))
    }

    pub fn with_output(output: Value) -> Self {
        Self::with_responder(move || Ok(output.clone()))
    }

    pub fn failing(make_error: impl Fn() -> ServiceError + Send + Sync + 'static) -> Self {
        Self::with_responder(move || Err(make_error()))
    }

    pub fn with_responder(responder: impl Fn() -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            call_count: Arc::new(Mutex::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockMusicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MusicService for MockMusicClient {
    async fn generate_audio(&self, prompt: &AudioPrompt) -> Result<String> {
        *self.call_count.lock().unwrap() += 1;
        self.prompts.lock().unwrap().push(prompt.as_str().to_string());
        normalize_output((self.responder)()?)
    }
}
