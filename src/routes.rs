use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        DefaultBodyLimit, Request, State,
    },
    http::header,
    routing::{get, post},
    Form, Json, RequestExt, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::SystemConfig;
use crate::error::ApiError;
use crate::music::AudioPrompt;
use crate::state::AppState;
use crate::vision::interface::check_content_type;
use crate::vision::ImageUpload;

const IMAGE_FIELD: &str = "image";
const PROMPT_FIELD: &str = "prompt";

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/describe-image-musically", post(describe_image_musically))
        .route("/generate-audio", post(generate_audio))
}

/// The full application: routes, body limit, tracing and CORS, bound to `state`.
pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let system_config = &state.config.system_config;
    let cors = cors_layer(system_config)?;
    let body_limit = DefaultBodyLimit::max(system_config.max_upload_bytes);

    Ok(create_routes()
        .layer(body_limit)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state))
}

/// Whitelisted origins with credentials. Methods and headers are mirrored
/// from the request since wildcards cannot be combined with credentials.
pub fn cors_layer(system_config: &SystemConfig) -> anyhow::Result<CorsLayer> {
    let origins = system_config.allowed_origins()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn describe_image_musically(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Rejected describe-image request: {}", e);
        ApiError::bad_request(e.body_text())
    })?;

    let image = read_image_upload(&mut multipart).await.map_err(|e| {
        warn!("Invalid describe-image upload: {}", e.message);
        e
    })?;

    info!(
        "Describing {} byte {} image",
        image.bytes().len(),
        image.content_type()
    );

    let description = state.vision.describe_image(&image).await.map_err(|e| {
        error!("Error processing image with vision provider: {}", e);
        ApiError::from(e)
    })?;

    Ok(Json(json!({ "description": description })))
}

/// Finds the `image` field and validates it. Other fields are skipped.
async fn read_image_upload(multipart: &mut Multipart) -> Result<ImageUpload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::with_status(e.status(), e.body_text()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        // Reject before buffering the body.
        let content_type = field.content_type().map(str::to_string);
        check_content_type(content_type.as_deref())?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::with_status(e.status(), e.body_text()))?;
        return Ok(ImageUpload::new(bytes.to_vec(), content_type.as_deref())?);
    }

    Err(ApiError::unprocessable(format!(
        "Missing file field `{}`",
        IMAGE_FIELD
    )))
}

#[derive(Debug, Deserialize)]
pub struct GenerateAudioForm {
    prompt: Option<String>,
}

/// Accepts the prompt as urlencoded or multipart form data.
async fn generate_audio(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let prompt = read_prompt(request)
        .await
        .and_then(|p| {
            p.ok_or_else(|| {
                ApiError::unprocessable(format!("Missing form field `{}`", PROMPT_FIELD))
            })
        })
        .and_then(|p| AudioPrompt::new(p).map_err(|e| ApiError::unprocessable(e.to_string())))
        .map_err(|e| {
            warn!("Invalid generate-audio request: {}", e.message);
            e
        })?;

    info!("Generating audio for prompt: {}", prompt.as_str());

    let audio_url = state.music.generate_audio(&prompt).await.map_err(|e| {
        error!("Error during audio generation: {}", e);
        ApiError::from(e)
    })?;

    Ok(Json(json!({ "audio_url": audio_url })))
}

async fn read_prompt(request: Request) -> Result<Option<String>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let Form(form) = request
            .extract::<Form<GenerateAudioForm>, _>()
            .await
            .map_err(|e| ApiError::unprocessable(e.body_text()))?;
        return Ok(form.prompt);
    }

    let mut multipart = request
        .extract::<Multipart, _>()
        .await
        .map_err(|e| ApiError::unprocessable(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::with_status(e.status(), e.body_text()))?
    {
        if field.name() == Some(PROMPT_FIELD) {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::with_status(e.status(), e.body_text()))?;
            return Ok(Some(text));
        }
    }
    Ok(None)
}
