//! HTTP client for the still-image and video-segment endpoints.
//!
//! The `upload_*` methods never fail: any transport or HTTP error is logged
//! and reported as `false`. The `try_upload_*` variants return the typed
//! error for callers that want it. Nothing is retried here.

use reqwest::multipart::{Form, Part};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::media::StillImage;
use crate::recorder::Segment;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("roomId is required")]
    MissingRoomId,
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Upload rejected with status {status}: {message}")]
    Status { status: u16, message: String },
}

/// JSON body of the still-image endpoint.
#[derive(Debug, Serialize)]
struct ImagePayload<'a> {
    image: String,
    #[serde(rename = "roomId")]
    room_id: &'a str,
}

/// Acknowledgement of an accepted image. Fields the backend leaves out keep
/// their defaults; a 2xx without a JSON body is still an acknowledgement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageAck {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "roomId", default)]
    pub room_id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentAck {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "roomId", default)]
    pub room_id: String,
    #[serde(rename = "chunkIndex", default)]
    pub chunk_index: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// The status code decides success; the body is informational only.
fn parse_ack<T: DeserializeOwned>(body: &str) -> Option<T> {
    if body.trim().is_empty() {
        return None;
    }
    serde_json::from_str(body)
        .inspect_err(|e| debug!("Upload acknowledged without a JSON body: {}", e))
        .ok()
}

#[derive(Clone)]
pub struct UploadClient {
    client: reqwest::Client,
    image_url: String,
    video_url: String,
}

impl UploadClient {
    pub fn new(config: &UploadConfig) -> Self {
        Self::with_urls(config.image_url(), config.video_url())
    }

    pub fn with_urls(image_url: impl Into<String>, video_url: impl Into<String>) -> Self {
        let image_url = image_url.into();
        let video_url = video_url.into();
        debug!("Upload client: image={}, video={}", image_url, video_url);

        Self {
            client: reqwest::Client::new(),
            image_url,
            video_url,
        }
    }

    pub async fn upload_still_image(&self, image: &StillImage, room_id: &str) -> bool {
        match self.try_upload_still_image(image, room_id).await {
            Ok(ack) => {
                info!(
                    "Identity image uploaded for room {} ({} bytes, ack at {})",
                    room_id,
                    image.len(),
                    ack.timestamp.as_deref().unwrap_or("-")
                );
                true
            }
            Err(e) => {
                warn!("Identity image upload for room {} failed: {}", room_id, e);
                false
            }
        }
    }

    pub async fn try_upload_still_image(
        &self,
        image: &StillImage,
        room_id: &str,
    ) -> Result<ImageAck, UploadError> {
        if room_id.trim().is_empty() {
            return Err(UploadError::MissingRoomId);
        }

        let payload = ImagePayload {
            image: image.to_data_url(),
            room_id,
        };

        let response = self
            .client
            .post(&self.image_url)
            .json(&payload)
            .send()
            .await?;

        let body = Self::successful_body(response).await?;
        Ok(parse_ack(&body).unwrap_or_else(|| ImageAck {
            success: true,
            room_id: room_id.to_string(),
            ..ImageAck::default()
        }))
    }

    pub async fn upload_segment(
        &self,
        segment: &Segment,
        room_id: &str,
        sequence_index: u64,
        user_id: Option<&str>,
    ) -> bool {
        match self
            .try_upload_segment(segment, room_id, sequence_index, user_id)
            .await
        {
            Ok(ack) => {
                debug!(
                    "Chunk {} uploaded for room {} ({} bytes acknowledged)",
                    sequence_index,
                    room_id,
                    ack.size.unwrap_or(segment.len() as u64)
                );
                true
            }
            Err(e) => {
                warn!(
                    "Chunk {} upload for room {} failed: {}",
                    sequence_index, room_id, e
                );
                false
            }
        }
    }

    pub async fn try_upload_segment(
        &self,
        segment: &Segment,
        room_id: &str,
        sequence_index: u64,
        user_id: Option<&str>,
    ) -> Result<SegmentAck, UploadError> {
        if room_id.trim().is_empty() {
            return Err(UploadError::MissingRoomId);
        }

        let mime_type = segment
            .mime_type
            .split(';')
            .next()
            .unwrap_or("application/octet-stream")
            .trim()
            .to_string();

        let part = Part::bytes(segment.data.clone())
            .file_name(segment.file_name())
            .mime_str(&mime_type)?;

        let mut form = Form::new()
            .part("video", part)
            .text("roomId", room_id.to_string())
            .text("chunkIndex", sequence_index.to_string());

        if let Some(user_id) = user_id {
            form = form.text("userId", user_id.to_string());
        }

        let response = self
            .client
            .post(&self.video_url)
            .multipart(form)
            .send()
            .await?;

        let body = Self::successful_body(response).await?;
        Ok(parse_ack(&body).unwrap_or_else(|| SegmentAck {
            success: true,
            room_id: room_id.to_string(),
            chunk_index: Some(sequence_index),
            ..SegmentAck::default()
        }))
    }

    async fn successful_body(response: reqwest::Response) -> Result<String, UploadError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(UploadError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ack_reads_json_body() {
        let ack: SegmentAck =
            parse_ack(r#"{"success":true,"roomId":"r","chunkIndex":4,"size":10}"#).unwrap();
        assert!(ack.success);
        assert_eq!(ack.chunk_index, Some(4));
        assert_eq!(ack.size, Some(10));
    }

    #[test]
    fn test_parse_ack_tolerates_missing_or_plain_body() {
        assert!(parse_ack::<SegmentAck>("").is_none());
        assert!(parse_ack::<ImageAck>("stored").is_none());
    }
}
