//! Upload endpoints.
//!
//! - `POST /api/upload-image`: JSON `{image, roomId}`
//! - `POST /api/upload-video`: multipart `video`, `roomId`, `chunkIndex`, `userId?`
//! - `GET  /api/rooms/:room_id`: what was received for a room, in chunk order

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::store::{decode_data_url, ReceivedChunk, SinkStore};

#[derive(Debug, Deserialize)]
pub struct ImageUpload {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(rename = "roomId", default)]
    pub room_id: Option<String>,
}

pub fn router(store: SinkStore) -> Router {
    Router::new()
        .route("/api/upload-image", post(upload_image))
        .route("/api/upload-video", post(upload_video))
        .route("/api/rooms/:room_id", get(room_uploads))
        .with_state(store)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn upload_image(
    State(store): State<SinkStore>,
    body: Result<Json<ImageUpload>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(upload) = body?;

    let (Some(room_id), Some(image)) = (non_empty(upload.room_id), non_empty(upload.image)) else {
        warn!("Image upload rejected: missing roomId or image");
        return Err(ApiError::bad_request("roomId and image are required"));
    };

    let bytes = decode_data_url(&image).map_err(|e| {
        warn!("Image upload rejected: payload is not base64: {}", e);
        ApiError::bad_request(format!("image must be a base64 data URL: {e}"))
    })?;

    let received = store.record_image(&room_id, &bytes).await?;
    info!(
        "Received identity image for room {} ({} bytes)",
        room_id, received.size
    );

    Ok(Json(json!({
        "success": true,
        "roomId": room_id,
        "timestamp": received.received_at.to_rfc3339(),
    })))
}

async fn upload_video(
    State(store): State<SinkStore>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut room_id = None;
    let mut chunk_index = None;
    let mut user_id = None;
    let mut video = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                video = Some((file_name, content_type, data));
            }
            "roomId" => room_id = non_empty(Some(field.text().await?)),
            "userId" => user_id = non_empty(Some(field.text().await?)),
            "chunkIndex" => {
                let raw = field.text().await?;
                let parsed = raw.trim().parse::<u64>().map_err(|_| {
                    ApiError::bad_request(format!("chunkIndex must be a non-negative integer, got '{raw}'"))
                })?;
                chunk_index = Some(parsed);
            }
            _ => {}
        }
    }

    let (Some(room_id), Some((file_name, content_type, data))) = (room_id, video) else {
        warn!("Video upload rejected: missing roomId or video");
        return Err(ApiError::bad_request("roomId and video are required"));
    };

    let received_at = Utc::now();
    let size = data.len();
    let chunk = ReceivedChunk {
        chunk_index,
        user_id,
        file_name,
        content_type,
        size,
        received_at,
    };
    store.record_chunk(&room_id, chunk, &data).await?;

    info!(
        "Received chunk {:?} for room {} ({} bytes)",
        chunk_index, room_id, size
    );

    Ok(Json(json!({
        "success": true,
        "roomId": room_id,
        "chunkIndex": chunk_index,
        "size": size,
        "timestamp": received_at.to_rfc3339(),
    })))
}

async fn room_uploads(
    State(store): State<SinkStore>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let room = store
        .room(&room_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("No uploads for room {room_id}")))?;

    Ok(Json(json!({
        "roomId": room_id,
        "chunks": room.ordered_chunks(),
        "images": room.images,
    })))
}
