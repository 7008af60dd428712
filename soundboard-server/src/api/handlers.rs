//! HTTP request handlers

use crate::api::server::AppContext;
use crate::audio::output::AudioOutput;
use crate::audio::types::AssetKey;
use crate::error::Error;
use crate::playback::PlaybackState;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct SoundEntry {
    filename: String,
    name: String,
    playing: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    filename: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    devices: Vec<String>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", message.into()),
        }),
    )
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, err.to_string())
    }
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "soundboard".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Sound Library
// ============================================================================

/// GET /api/sounds - playable files with their playback state
pub async fn list_sounds(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<SoundEntry>>, ApiError> {
    let names = ctx.library.list().map_err(|e| {
        error!("Failed to list sounds: {}", e);
        ApiError::from(e)
    })?;

    let sounds = names
        .into_iter()
        .map(|filename| {
            let name = Path::new(&filename)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&filename)
                .to_string();
            let playing = ctx.controller.state(&AssetKey::new(filename.as_str())) != PlaybackState::Idle;
            SoundEntry {
                filename,
                name,
                playing,
            }
        })
        .collect();

    Ok(Json(sounds))
}

/// POST /api/upload - multipart upload, field `file` or `sound`
pub async fn upload_sound(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(e.status(), e.body_text()))?
    {
        if !matches!(field.name(), Some("file") | Some("sound")) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "missing file name"))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(e.status(), e.body_text()))?;

        let library = ctx.library.clone();
        let saved_name = filename.clone();
        tokio::task::spawn_blocking(move || library.save(&saved_name, &bytes))
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .map_err(|e| {
                warn!("Upload of {} rejected: {}", filename, e);
                ApiError::from(e)
            })?;

        info!("Uploaded {}", filename);
        return Ok((StatusCode::CREATED, Json(UploadResponse { filename })));
    }

    Err(api_error(StatusCode::BAD_REQUEST, "no file field in upload"))
}

// ============================================================================
// Audio Device Endpoints
// ============================================================================

/// GET /api/audio/devices - List available audio output devices
pub async fn list_audio_devices() -> Result<Json<DeviceListResponse>, ApiError> {
    match tokio::task::spawn_blocking(AudioOutput::list_devices).await {
        Ok(Ok(devices)) => Ok(Json(DeviceListResponse { devices })),
        Ok(Err(e)) => {
            error!("Failed to list audio devices: {}", e);
            Err(e.into())
        }
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
