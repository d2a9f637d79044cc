use anyhow::{bail, Result};
use axum::http::HeaderValue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const REPLICATE_API_TOKEN_VAR: &str = "REPLICATE_API_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system_config: SystemConfig,
    #[serde(default)]
    pub vision_config: VisionConfig,
    #[serde(default)]
    pub music_config: MusicConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// OpenAI chat completions settings for the image describer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,
}

/// Replicate settings for the music generator. The model and its inputs are
/// fixed in `music::replicate_client`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_replicate_base_url")]
    pub base_url: String,
    /// Upper bound for the whole prediction, including status polling.
    #[serde(default = "default_music_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_vision_model() -> String {
    "o4-mini".to_string()
}

fn default_vision_timeout_secs() -> u64 {
    60
}

fn default_replicate_base_url() -> String {
    "https://api.replicate.com".to_string()
}

fn default_music_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openai_base_url(),
            model: default_vision_model(),
            timeout_secs: default_vision_timeout_secs(),
        }
    }
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: default_replicate_base_url(),
            timeout_secs: default_music_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Config {
    /// Load a YAML or JSON config file, expanding `${VAR}` placeholders from
    /// the environment first.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            bail!("Configuration file not found: {}", path);
        }
        let content = substitute_env_vars(&fs::read_to_string(path)?);
        Self::parse(path, &content)
    }

    fn parse(path: &str, content: &str) -> Result<Self> {
        let path_lower = path.to_lowercase();
        if path_lower.ends_with(".json") {
            Ok(serde_json::from_str(content)?)
        } else {
            Ok(serde_yaml::from_str(content)?)
        }
    }

    /// Defaults everywhere, credentials taken from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.vision_config.api_key = std::env::var(OPENAI_API_KEY_VAR).unwrap_or_default();
        config.music_config.api_token =
            std::env::var(REPLICATE_API_TOKEN_VAR).unwrap_or_default();
        config
    }

    /// Refuse configurations the server cannot run with. Called before the
    /// listener is bound so a bad deployment never accepts traffic.
    pub fn validate(&self) -> Result<()> {
        if is_unset(&self.vision_config.api_key) {
            bail!("{} is not set; refusing to start", OPENAI_API_KEY_VAR);
        }
        if is_unset(&self.music_config.api_token) {
            bail!("{} is not set; refusing to start", REPLICATE_API_TOKEN_VAR);
        }
        if self.vision_config.timeout_secs == 0 || self.music_config.timeout_secs == 0 {
            bail!("Provider timeouts must be greater than zero");
        }
        if self.music_config.poll_interval_ms == 0 {
            bail!("music_config.poll_interval_ms must be greater than zero");
        }
        self.system_config.allowed_origins()?;
        Ok(())
    }
}

impl SystemConfig {
    pub fn allowed_origins(&self) -> Result<Vec<HeaderValue>> {
        if self.cors_origins.is_empty() {
            bail!("cors_origins must list at least one origin");
        }
        self.cors_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {:?}: {}", origin, e))
            })
            .collect()
    }
}

/// Replace `${VAR_NAME}` with the variable's value, leaving unknown ones as-is.
pub fn substitute_env_vars(content: &str) -> String {
    let pattern = Regex::new(r"\$\{(\w+)\}").expect("static regex");
    pattern
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn is_unset(secret: &str) -> bool {
    let trimmed = secret.trim();
    trimmed.is_empty() || (trimmed.starts_with("${") && trimmed.ends_with('}'))
}
