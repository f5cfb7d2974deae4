//! Device acquisition on top of the platform capture API.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::stream::{LiveStream, MediaSource, MediaTrack, TrackKind};

/// Why a capture request did not produce a stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("No capture device found: {0}")]
    NotFound(String),
    #[error("Capture not supported: {0}")]
    NotSupported(String),
    #[error("Capture request was cancelled")]
    Cancelled,
    #[error("Capture device error: {0}")]
    Other(String),
}

impl DeviceError {
    /// Whether the UI should show the "access denied" state rather than a generic failure.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, DeviceError::PermissionDenied(_) | DeviceError::Cancelled)
    }
}

/// Which kinds of track a user-media request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub const CAMERA_AND_MICROPHONE: Self = Self {
        audio: true,
        video: true,
    };
    pub const MICROPHONE: Self = Self {
        audio: true,
        video: false,
    };
}

/// Platform capture API.
///
/// Implementations may suspend indefinitely while a permission prompt or
/// display picker is open.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request local camera and/or microphone tracks.
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Vec<Arc<MediaTrack>>, DeviceError>;

    /// Request a video capture of a display, window or tab.
    async fn get_display_media(&self) -> Result<Vec<Arc<MediaTrack>>, DeviceError>;
}

/// Turns platform capture results into owned [`LiveStream`]s.
///
/// Never retries; a failure is returned to the caller as-is.
#[derive(Clone)]
pub struct DeviceAcquisition {
    devices: Arc<dyn MediaDevices>,
}

impl DeviceAcquisition {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self { devices }
    }

    pub async fn acquire_camera_and_microphone(&self) -> Result<LiveStream, DeviceError> {
        let tracks = self
            .devices
            .get_user_media(MediaConstraints::CAMERA_AND_MICROPHONE)
            .await
            .inspect_err(|e| warn!("Camera/microphone acquisition failed: {}", e))?;

        if !tracks.iter().any(|t| t.kind() == TrackKind::Video) {
            // Dropping the tracks stops whatever was granted.
            return Err(DeviceError::NotFound("no camera track returned".to_string()));
        }

        let stream = LiveStream::new(MediaSource::CameraAndMicrophone, tracks);
        info!(
            "Acquired camera+microphone stream {} ({} tracks)",
            stream.id(),
            stream.tracks().len()
        );
        Ok(stream)
    }

    /// Video-only display capture. Audio tracks are never requested here.
    pub async fn acquire_screen_share(&self) -> Result<LiveStream, DeviceError> {
        let tracks = self
            .devices
            .get_display_media()
            .await
            .inspect_err(|e| warn!("Screen share acquisition failed: {}", e))?;

        let (video, extra): (Vec<_>, Vec<_>) = tracks
            .into_iter()
            .partition(|t| t.kind() == TrackKind::Video);
        drop(extra);

        if video.is_empty() {
            return Err(DeviceError::NotFound("no display track returned".to_string()));
        }

        let stream = LiveStream::new(MediaSource::ScreenShare, video);
        info!("Acquired screen share stream {}", stream.id());
        Ok(stream)
    }

    /// Screen share plus a separately requested microphone track.
    ///
    /// A missing or denied microphone degrades to a video-only stream; only a
    /// failed display capture is an error.
    pub async fn acquire_screen_share_with_microphone(&self) -> Result<LiveStream, DeviceError> {
        let stream = self.acquire_screen_share().await?;

        match self
            .devices
            .get_user_media(MediaConstraints::MICROPHONE)
            .await
        {
            Ok(tracks) => {
                let audio: Vec<_> = tracks
                    .into_iter()
                    .filter(|t| t.kind() == TrackKind::Audio)
                    .collect();
                Ok(stream.with_tracks(audio))
            }
            Err(e) => {
                warn!("Microphone unavailable for screen share, recording video only: {}", e);
                Ok(stream)
            }
        }
    }
}

/// Release a stream if there is one. A `None` or already released stream is a no-op.
pub fn release(stream: Option<&LiveStream>) {
    if let Some(stream) = stream {
        stream.release();
    }
}
