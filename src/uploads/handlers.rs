use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::services::{ext_from_mime, upload_identifier_image, UploadItem, MAX_IMAGE_BYTES};

// Room for boundaries and part headers around a full-size file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;
use crate::{auth::AuthUser, error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_url: String,
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/me/identifier-image", post(upload_identifier))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + MULTIPART_OVERHEAD))
}

/// POST /me/identifier-image (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_identifier(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if ext_from_mime(&content_type).is_none() {
            warn!(user_id, %content_type, "unsupported identifier image type");
            return Err(ApiError::bad_request("Unsupported image type"));
        }
        let body = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        if body.len() > MAX_IMAGE_BYTES {
            warn!(user_id, bytes = body.len(), "identifier image too large");
            return Err(ApiError::bad_request("File too large. Maximum size is 5MB."));
        }

        let file_url = upload_identifier_image(
            &state,
            user_id,
            UploadItem {
                body,
                content_type: &content_type,
            },
        )
        .await
        .map_err(|e| {
            error!(error = ?e, user_id, "identifier upload failed");
            ApiError::internal(format!("{:#}", e))
        })?;

        info!(user_id, %file_url, "identifier image stored");
        return Ok(Json(UploadResponse {
            success: true,
            file_url,
        }));
    }

    Err(ApiError::bad_request("file is required"))
}
