//! Platform media encoder seam used by the segment recorder.

use thiserror::Error;
use tokio::sync::mpsc;

use super::stream::LiveStream;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncoderError {
    #[error("Recording format not supported: {0}")]
    Unsupported(String),
    #[error("Stream {0} has no live tracks to encode")]
    StreamEnded(String),
    #[error("Encoder failed: {0}")]
    Other(String),
}

/// Encoded output of one open encoder.
///
/// Bytes arrive in capture order. Encoding stops once `data` is dropped.
pub struct EncodedFeed {
    pub mime_type: String,
    pub data: mpsc::Receiver<Vec<u8>>,
}

pub trait MediaEncoder: Send + Sync {
    /// Capability probe for a container/codec pairing such as `video/webm;codecs=vp8,opus`.
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Start encoding every track of `stream`. `None` asks for the platform default format.
    fn open(&self, stream: &LiveStream, mime_type: Option<&str>)
        -> Result<EncodedFeed, EncoderError>;
}
