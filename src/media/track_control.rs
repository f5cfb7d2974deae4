//! Mute / camera-off toggles.
//!
//! These flip the `enabled` flag of the first track of a kind. The device
//! stays acquired, so switching back is instant and needs no new permission.

use tracing::debug;

use super::stream::{LiveStream, TrackKind};

/// Returns whether a track was toggled.
pub fn set_audio_enabled(stream: Option<&LiveStream>, enabled: bool) -> bool {
    set_track_enabled(stream, TrackKind::Audio, enabled)
}

/// Returns whether a track was toggled.
pub fn set_video_enabled(stream: Option<&LiveStream>, enabled: bool) -> bool {
    set_track_enabled(stream, TrackKind::Video, enabled)
}

fn set_track_enabled(stream: Option<&LiveStream>, kind: TrackKind, enabled: bool) -> bool {
    let Some(track) = stream.and_then(|s| s.first_track(kind)) else {
        return false;
    };

    track.set_enabled(enabled);
    debug!(
        "{} track '{}' {}",
        kind.as_str(),
        track.label(),
        if enabled { "enabled" } else { "disabled" }
    );
    true
}
