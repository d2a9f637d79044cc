//! HTTP backend that turns images into musical descriptions and prompts into
//! generated audio by delegating to hosted AI providers.

pub mod config;
pub mod error;
pub mod music;
pub mod routes;
pub mod state;
pub mod vision;

pub use error::{ApiError, Result, ServiceError};
