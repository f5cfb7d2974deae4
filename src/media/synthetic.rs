//! Deterministic in-process platform: scripted permissions, a byte-rate
//! encoder driven by tokio time and a feed with an optional still frame.
//!
//! Backs `roomcap simulate` and the test suite.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::devices::{DeviceError, MediaConstraints, MediaDevices};
use super::encoder::{EncodedFeed, EncoderError, MediaEncoder};
use super::frame::{VideoFeed, VideoFrame};
use super::stream::{LiveStream, MediaTrack, TrackDevice, TrackKind};

/// Scripted outcome of a synthetic permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Unavailable,
    Unsupported,
    Cancelled,
}

impl Permission {
    fn check(self, what: &str) -> Result<(), DeviceError> {
        match self {
            Permission::Granted => Ok(()),
            Permission::Denied => Err(DeviceError::PermissionDenied(what.to_string())),
            Permission::Unavailable => Err(DeviceError::NotFound(what.to_string())),
            Permission::Unsupported => Err(DeviceError::NotSupported(what.to_string())),
            Permission::Cancelled => Err(DeviceError::Cancelled),
        }
    }
}

/// Counts how many synthetic devices are currently held.
struct SyntheticDevice {
    active: Arc<AtomicUsize>,
}

impl SyntheticDevice {
    fn acquire(active: &Arc<AtomicUsize>) -> Box<Self> {
        active.fetch_add(1, Ordering::SeqCst);
        Box::new(Self {
            active: active.clone(),
        })
    }
}

impl TrackDevice for SyntheticDevice {
    fn stop(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct SyntheticDevices {
    camera: Permission,
    microphone: Permission,
    display: Permission,
    active: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticDevices {
    pub fn new() -> Self {
        Self {
            camera: Permission::Granted,
            microphone: Permission::Granted,
            display: Permission::Granted,
            active: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_camera(mut self, permission: Permission) -> Self {
        self.camera = permission;
        self
    }

    pub fn with_microphone(mut self, permission: Permission) -> Self {
        self.microphone = permission;
        self
    }

    pub fn with_display(mut self, permission: Permission) -> Self {
        self.display = permission;
        self
    }

    /// Devices acquired and not yet stopped, across all clones.
    pub fn active_devices(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Capture requests seen so far, granted or not.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn track(&self, kind: TrackKind, label: &str) -> Arc<MediaTrack> {
        Arc::new(MediaTrack::new(
            kind,
            label,
            SyntheticDevice::acquire(&self.active),
        ))
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Vec<Arc<MediaTrack>>, DeviceError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if constraints.video {
            self.camera.check("camera")?;
        }
        if constraints.audio {
            self.microphone.check("microphone")?;
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(self.track(TrackKind::Audio, "Synthetic Microphone"));
        }
        if constraints.video {
            tracks.push(self.track(TrackKind::Video, "Synthetic Camera"));
        }
        Ok(tracks)
    }

    async fn get_display_media(&self) -> Result<Vec<Arc<MediaTrack>>, DeviceError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.display.check("display")?;
        Ok(vec![self.track(TrackKind::Video, "Synthetic Display")])
    }
}

/// Produces `bytes_per_tick` bytes every `tick` while the stream is live.
#[derive(Debug, Clone)]
pub struct SyntheticEncoder {
    supported: Vec<String>,
    default_mime_type: Option<String>,
    tick: Duration,
    bytes_per_tick: usize,
}

impl Default for SyntheticEncoder {
    fn default() -> Self {
        Self::new(["video/webm;codecs=vp8,opus", "video/webm"])
    }
}

impl SyntheticEncoder {
    pub fn new<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: supported.into_iter().map(Into::into).collect(),
            default_mime_type: Some("video/webm".to_string()),
            tick: Duration::from_millis(100),
            bytes_per_tick: 1024,
        }
    }

    /// Platform without a usable default format; opening with `None` fails.
    pub fn without_default(mut self) -> Self {
        self.default_mime_type = None;
        self
    }

    pub fn with_rate(mut self, tick: Duration, bytes_per_tick: usize) -> Self {
        self.tick = tick;
        self.bytes_per_tick = bytes_per_tick;
        self
    }
}

impl MediaEncoder for SyntheticEncoder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|s| s == mime_type)
    }

    fn open(
        &self,
        stream: &LiveStream,
        mime_type: Option<&str>,
    ) -> Result<EncodedFeed, EncoderError> {
        let mime_type = match mime_type {
            Some(requested) if self.is_type_supported(requested) => requested.to_string(),
            Some(requested) => return Err(EncoderError::Unsupported(requested.to_string())),
            None => self
                .default_mime_type
                .clone()
                .ok_or_else(|| EncoderError::Unsupported("platform default".to_string()))?,
        };

        if !stream.is_live() {
            return Err(EncoderError::StreamEnded(stream.id().to_string()));
        }

        let tracks: Vec<Arc<MediaTrack>> = stream.tracks().to_vec();
        let (tx, rx) = mpsc::channel(64);
        let tick = self.tick;
        let bytes_per_tick = self.bytes_per_tick;
        let stream_id = stream.id();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
            let mut sequence: u8 = 0;
            loop {
                interval.tick().await;
                if !tracks.iter().any(|t| t.is_live()) {
                    break;
                }
                // Disabled tracks still produce (blank) samples.
                let fill = if tracks.iter().any(|t| t.is_enabled()) {
                    sequence
                } else {
                    0
                };
                sequence = sequence.wrapping_add(1);
                if tx.send(vec![fill; bytes_per_tick]).await.is_err() {
                    break;
                }
            }
            debug!("Synthetic encoder for stream {} finished", stream_id);
        });

        Ok(EncodedFeed { mime_type, data: rx })
    }
}

/// A video feed whose current frame is set by hand.
#[derive(Default)]
pub struct SyntheticFeed {
    frame: Mutex<Option<VideoFrame>>,
}

impl SyntheticFeed {
    /// A feed that has not decoded anything yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A feed showing a colour gradient of the given size.
    pub fn with_test_pattern(width: u32, height: u32) -> Self {
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                rgb.push((x * 255 / width.max(1)) as u8);
                rgb.push((y * 255 / height.max(1)) as u8);
                rgb.push(((x ^ y) & 0xFF) as u8);
            }
        }
        let feed = Self::empty();
        feed.set_frame(Some(VideoFrame { width, height, rgb }));
        feed
    }

    pub fn set_frame(&self, frame: Option<VideoFrame>) {
        let mut guard = self.frame.lock().unwrap_or_else(|e| e.into_inner());
        *guard = frame;
    }
}

impl VideoFeed for SyntheticFeed {
    fn current_frame(&self) -> Option<VideoFrame> {
        self.frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
