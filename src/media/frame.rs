//! Still-frame capture for identity confirmation.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// A decoded RGB8 frame as currently displayed by a video feed.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Anything that shows live video and can hand out its current frame.
pub trait VideoFeed: Send + Sync {
    /// `None` until the first frame has been decoded.
    fn current_frame(&self) -> Option<VideoFrame>;
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No decoded video frame available yet")]
    NoFrame,
    #[error("Frame buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    MalformedFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A single encoded frame.
#[derive(Debug, Clone)]
pub struct StillImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl StillImage {
    pub const MIME_TYPE: &'static str = "image/jpeg";

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Self-contained `data:` URL, usable as a JSON string field.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", Self::MIME_TYPE, BASE64.encode(&self.data))
    }
}

/// Samples a feed at its native resolution and encodes the frame as JPEG.
#[derive(Debug, Clone, Copy)]
pub struct FrameCapture {
    quality: u8,
}

impl Default for FrameCapture {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameCapture {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn capture(&self, feed: &dyn VideoFeed) -> Result<StillImage, CaptureError> {
        let frame = feed.current_frame().ok_or(CaptureError::NoFrame)?;
        if frame.width == 0 || frame.height == 0 {
            return Err(CaptureError::NoFrame);
        }

        let expected = frame.width as usize * frame.height as usize * 3;
        let actual = frame.rgb.len();
        let image = RgbImage::from_raw(frame.width, frame.height, frame.rgb).ok_or(
            CaptureError::MalformedFrame {
                width: frame.width,
                height: frame.height,
                expected,
                actual,
            },
        )?;

        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.quality).encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )?;

        debug!(
            "Captured {}x{} still at quality {} ({} bytes)",
            image.width(),
            image.height(),
            self.quality,
            data.len()
        );

        Ok(StillImage {
            data,
            width: image.width(),
            height: image.height(),
            captured_at: Utc::now(),
        })
    }
}

/// Capture with the default quality.
pub fn capture_frame(feed: &dyn VideoFeed) -> Result<StillImage, CaptureError> {
    FrameCapture::default().capture(feed)
}
