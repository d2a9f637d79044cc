use std::sync::Arc;

use crate::config::Config;
use crate::music::{MusicService, ReplicateMusicClient};
use crate::vision::{OpenAIVisionClient, VisionService};

/// Everything a handler needs, built once at startup and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub vision: Arc<dyn VisionService>,
    pub music: Arc<dyn MusicService>,
}

impl AppState {
    /// Builds the provider adapters from an already validated config.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let vision = Arc::new(OpenAIVisionClient::new(&config.vision_config)?);
        let music = Arc::new(ReplicateMusicClient::new(&config.music_config)?);
        Ok(Self::with_services(config, vision, music))
    }

    pub fn with_services(
        config: Config,
        vision: Arc<dyn VisionService>,
        music: Arc<dyn MusicService>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            vision,
            music,
        }
    }
}
