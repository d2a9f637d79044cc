use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use musicvision_backend::config::Config;
use musicvision_backend::routes;
use musicvision_backend::state::AppState;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["conf.yaml", "conf.json"];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "musicvision_backend=debug,tower_http=debug".into()),
        )
        .init();

    let config = load_config()?;
    config.validate()?;

    let app_state = AppState::new(config.clone())?;
    let app = routes::build_app(app_state)?;

    let system_config = &config.system_config;
    let listener =
        tokio::net::TcpListener::bind((system_config.host.as_str(), system_config.port)).await?;
    info!("Starting server on {}", listener.local_addr()?);
    info!("CORS origins: {:?}", system_config.cors_origins);

    axum::serve(listener, app).await?;

    Ok(())
}

/// `CONFIG_PATH` must load if set. Otherwise the first default file that
/// exists is used, falling back to environment-only configuration.
fn load_config() -> Result<Config> {
    if let Ok(path) = std::env::var("CONFIG_PATH") {
        let config = Config::load(&path)?;
        info!("Loaded configuration from: {}", path);
        return Ok(config);
    }

    for path in DEFAULT_CONFIG_PATHS {
        if Path::new(path).exists() {
            let config = Config::load(path)?;
            info!("Loaded configuration from: {}", path);
            return Ok(config);
        }
    }

    warn!("No configuration file found, using defaults and environment credentials");
    Ok(Config::from_env())
}
