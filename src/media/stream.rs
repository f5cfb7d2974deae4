//! Live capture streams and the tracks they own.
//!
//! A [`LiveStream`] is the only handle through which camera, microphone and
//! display hardware is held. Releasing it (explicitly or by dropping it) stops
//! every constituent track, which is what turns the device indicator off.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Which capture source feeds the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    CameraAndMicrophone,
    ScreenShare,
}

impl MediaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::CameraAndMicrophone => "camera_and_microphone",
            MediaSource::ScreenShare => "screen_share",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// Platform handle for the hardware behind one track.
pub trait TrackDevice: Send + Sync {
    /// Release the device. Called at most once per track.
    fn stop(&self);
}

/// One audio or video track of a capture.
///
/// `enabled` only blanks or silences the output; `stop` frees the device and
/// cannot be undone.
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    live: AtomicBool,
    device: Box<dyn TrackDevice>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>, device: Box<dyn TrackDevice>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            enabled: AtomicBool::new(true),
            live: AtomicBool::new(true),
            device,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop the track and release its device. Safe to call repeatedly.
    pub fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!("Stopping {} track '{}'", self.kind.as_str(), self.label);
            self.device.stop();
        }
    }
}

impl Drop for MediaTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("enabled", &self.is_enabled())
            .field("live", &self.is_live())
            .finish()
    }
}

/// Ownership handle for a set of live tracks from one acquisition.
#[derive(Debug)]
pub struct LiveStream {
    id: Uuid,
    source: MediaSource,
    tracks: Vec<Arc<MediaTrack>>,
    released: AtomicBool,
}

impl LiveStream {
    pub fn new(source: MediaSource, tracks: Vec<Arc<MediaTrack>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            tracks,
            released: AtomicBool::new(false),
        }
    }

    /// Attach tracks obtained from a separate acquisition (e.g. a microphone
    /// alongside a screen share). They are released together with this stream.
    pub fn with_tracks(mut self, extra: Vec<Arc<MediaTrack>>) -> Self {
        self.tracks.extend(extra);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> MediaSource {
        self.source
    }

    pub fn tracks(&self) -> &[Arc<MediaTrack>] {
        &self.tracks
    }

    pub fn first_track(&self, kind: TrackKind) -> Option<&Arc<MediaTrack>> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.first_track(kind).is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// True while the stream is unreleased and at least one track is running.
    pub fn is_live(&self) -> bool {
        !self.is_released() && self.tracks.iter().any(|t| t.is_live())
    }

    /// Stop every track. Calling this again is a no-op.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        for track in &self.tracks {
            track.stop();
        }

        info!(
            "Released {} stream {} ({} tracks)",
            self.source.as_str(),
            self.id,
            self.tracks.len()
        );
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        if !self.is_released() {
            debug!("Dropping unreleased stream {}, releasing devices", self.id);
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingDevice(Arc<AtomicUsize>);

    impl TrackDevice for CountingDevice {
        fn stop(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn track(kind: TrackKind, stops: &Arc<AtomicUsize>) -> Arc<MediaTrack> {
        Arc::new(MediaTrack::new(
            kind,
            kind.as_str(),
            Box::new(CountingDevice(stops.clone())),
        ))
    }

    #[test]
    fn test_release_stops_every_track_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let stream = LiveStream::new(
            MediaSource::CameraAndMicrophone,
            vec![track(TrackKind::Audio, &stops), track(TrackKind::Video, &stops)],
        );
        assert!(stream.is_live());

        stream.release();
        stream.release();

        assert_eq!(stops.load(Ordering::SeqCst), 2);
        assert!(!stream.is_live());
        assert!(stream.tracks().iter().all(|t| !t.is_live()));
    }

    #[test]
    fn test_drop_releases_devices() {
        let stops = Arc::new(AtomicUsize::new(0));
        {
            let _stream = LiveStream::new(
                MediaSource::ScreenShare,
                vec![track(TrackKind::Video, &stops)],
            );
        }
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_stops_tracks_still_shared_elsewhere() {
        let stops = Arc::new(AtomicUsize::new(0));
        let video = track(TrackKind::Video, &stops);
        let stream = LiveStream::new(MediaSource::ScreenShare, vec![video.clone()]);

        stream.release();
        assert!(!video.is_live());
        drop(video);
        drop(stream);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_with_tracks_merges_sources() {
        let stops = Arc::new(AtomicUsize::new(0));
        let stream = LiveStream::new(MediaSource::ScreenShare, vec![track(TrackKind::Video, &stops)])
            .with_tracks(vec![track(TrackKind::Audio, &stops)]);

        assert_eq!(stream.source(), MediaSource::ScreenShare);
        assert!(stream.has_track(TrackKind::Audio));
        assert!(stream.has_track(TrackKind::Video));
    }
}
