//! Ordered capability negotiation for the recording container/codec.

use tracing::{debug, info, warn};

use crate::media::MediaEncoder;

/// Most compact pairing first, most widely supported last.
pub const DEFAULT_FORMAT_PREFERENCES: &[&str] = &[
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm",
    "video/mp4",
];

/// First candidate the encoder reports as supported, or `None` to let the
/// platform pick its default.
pub fn negotiate_format<S: AsRef<str>>(encoder: &dyn MediaEncoder, candidates: &[S]) -> Option<String> {
    for candidate in candidates {
        let candidate = candidate.as_ref();
        if encoder.is_type_supported(candidate) {
            info!("Recording format negotiated: {}", candidate);
            return Some(candidate.to_string());
        }
        debug!("Recording format not supported: {}", candidate);
    }

    warn!("No preferred recording format supported, falling back to platform default");
    None
}

/// File extension for a segment upload, derived from its MIME type.
pub fn extension_for(mime_type: &str) -> &'static str {
    let container = mime_type.split(';').next().unwrap_or_default().trim();
    match container {
        "video/webm" | "audio/webm" => "webm",
        "video/mp4" | "audio/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        "video/ogg" | "audio/ogg" => "ogg",
        _ => "bin",
    }
}
