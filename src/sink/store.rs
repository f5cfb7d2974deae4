//! In-memory record of what the stub backend received.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedChunk {
    pub chunk_index: Option<u64>,
    pub user_id: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedImage {
    pub size: usize,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RoomUploads {
    /// Arrival order.
    pub chunks: Vec<ReceivedChunk>,
    pub images: Vec<ReceivedImage>,
}

impl RoomUploads {
    /// Chunks reordered by `chunkIndex`; unnumbered chunks keep arrival order at the end.
    pub fn ordered_chunks(&self) -> Vec<ReceivedChunk> {
        let mut chunks = self.chunks.clone();
        chunks.sort_by_key(|c| c.chunk_index.unwrap_or(u64::MAX));
        chunks
    }
}

#[derive(Clone, Default)]
pub struct SinkStore {
    rooms: Arc<Mutex<HashMap<String, RoomUploads>>>,
    persist_dir: Option<PathBuf>,
}

impl SinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write payloads to `<dir>/<roomId>/`.
    pub fn persisting_to(dir: PathBuf) -> Self {
        Self {
            rooms: Arc::default(),
            persist_dir: Some(dir),
        }
    }

    pub async fn record_chunk(
        &self,
        room_id: &str,
        chunk: ReceivedChunk,
        data: &[u8],
    ) -> Result<()> {
        if let Some(dir) = &self.persist_dir {
            let name = chunk
                .file_name
                .clone()
                .unwrap_or_else(|| format!("chunk-{}.bin", chunk.chunk_index.unwrap_or(0)));
            let path = dir.join(sanitize(room_id)).join(sanitize(&name));
            write_file(path, data).await?;
        }

        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room_id.to_string())
            .or_default()
            .chunks
            .push(chunk);
        Ok(())
    }

    /// Record a decoded identity image (see [`decode_data_url`]).
    pub async fn record_image(&self, room_id: &str, bytes: &[u8]) -> Result<ReceivedImage> {
        let received_at = Utc::now();
        let image = ReceivedImage {
            size: bytes.len(),
            received_at,
        };

        if let Some(dir) = &self.persist_dir {
            let name = format!("identity-{}.jpg", received_at.format("%Y%m%d-%H%M%S%.3f"));
            write_file(dir.join(sanitize(room_id)).join(name), bytes).await?;
        }

        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room_id.to_string())
            .or_default()
            .images
            .push(image.clone());
        Ok(image)
    }

    pub async fn room(&self, room_id: &str) -> Option<RoomUploads> {
        self.rooms.lock().await.get(room_id).cloned()
    }
}

/// Decode a `data:<mime>;base64,<payload>` URL, or a bare base64 payload.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded = data_url
        .split_once(',')
        .map(|(_, data)| data)
        .unwrap_or(data_url);
    BASE64.decode(encoded.trim())
}

async fn write_file(path: PathBuf, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create upload directory")?;
    }
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    debug!("Stored upload at {:?}", path);
    Ok(())
}

/// Keep client-supplied names from escaping the upload directory.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}
