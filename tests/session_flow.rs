//! Interview sessions on synthetic devices, uploading to a local sink.

use async_trait::async_trait;
use roomcap::media::synthetic::{Permission, SyntheticDevices, SyntheticEncoder, SyntheticFeed};
use roomcap::media::{
    CaptureError, DeviceAcquisition, DeviceError, MediaConstraints, MediaDevices, MediaSource,
    MediaTrack, TrackKind,
};
use roomcap::recorder::RecorderOptions;
use roomcap::session::{
    InterviewSession, SessionError, SessionOptions, SessionPhase, SessionStatusHandle,
};
use roomcap::sink::{self, SinkStore};
use roomcap::upload::UploadClient;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

const ROOM: &str = "room-7";
const INTERVAL: Duration = Duration::from_millis(300);

/// Remembers how many devices were still held when the display was requested.
struct ObservingDevices {
    inner: SyntheticDevices,
    held_at_display_request: Arc<Mutex<Option<usize>>>,
}

#[async_trait]
impl MediaDevices for ObservingDevices {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Vec<Arc<MediaTrack>>, DeviceError> {
        self.inner.get_user_media(constraints).await
    }

    async fn get_display_media(&self) -> Result<Vec<Arc<MediaTrack>>, DeviceError> {
        *self.held_at_display_request.lock().unwrap() = Some(self.inner.active_devices());
        self.inner.get_display_media().await
    }
}

async fn spawn_sink() -> (String, SinkStore) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let store = SinkStore::new();
    let server_store = store.clone();
    tokio::spawn(async move {
        let _ = sink::serve(listener, server_store).await;
    });
    (base, store)
}

fn options() -> SessionOptions {
    SessionOptions {
        interval: INTERVAL,
        recorder: RecorderOptions::default(),
        jpeg_quality: 80,
        screen_share_audio: true,
    }
}

fn session_with(base: &str, devices: Arc<dyn MediaDevices>) -> InterviewSession {
    session_with_options(base, devices, options())
}

fn session_with_options(
    base: &str,
    devices: Arc<dyn MediaDevices>,
    options: SessionOptions,
) -> InterviewSession {
    InterviewSession::new(
        ROOM,
        Some("candidate-1"),
        DeviceAcquisition::new(devices),
        Arc::new(SyntheticEncoder::default().with_rate(Duration::from_millis(50), 64)),
        UploadClient::with_urls(
            format!("{base}/api/upload-image"),
            format!("{base}/api/upload-video"),
        ),
        options,
        SessionStatusHandle::default(),
    )
}

async fn received_indices(store: &SinkStore) -> Vec<Option<u64>> {
    store
        .room(ROOM)
        .await
        .map(|room| room.ordered_chunks().iter().map(|c| c.chunk_index).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_camera_session_uploads_every_segment() {
    let (base, store) = spawn_sink().await;
    let devices = SyntheticDevices::new();
    let mut session = session_with(&base, Arc::new(devices.clone()));

    session.start().await.unwrap();
    assert!(session.is_recording());
    assert_eq!(devices.active_devices(), 2);
    assert_eq!(session.status().get().await.phase, SessionPhase::Recording);

    tokio::time::sleep(Duration::from_millis(750)).await;
    let summary = session.finish().await;

    assert_eq!(summary.total, 3);
    assert!(summary.all_uploaded());
    assert_eq!(received_indices(&store).await, vec![Some(0), Some(1), Some(2)]);
    assert_eq!(devices.active_devices(), 0);
    assert_eq!(session.status().get().await.phase, SessionPhase::Completed);
}

#[tokio::test]
async fn test_switch_to_screen_share_keeps_numbering() {
    let (base, store) = spawn_sink().await;
    let held = Arc::new(Mutex::new(None));
    let devices = SyntheticDevices::new();
    let observing = ObservingDevices {
        inner: devices.clone(),
        held_at_display_request: held.clone(),
    };
    let mut session = session_with(&base, Arc::new(observing));

    session.start().await.unwrap();
    let camera = session.stream().unwrap().clone();

    tokio::time::sleep(Duration::from_millis(450)).await;
    session.switch_source(MediaSource::ScreenShare).await.unwrap();

    // Segment 0 on a timer, segment 1 flushed by the switch.
    assert_eq!(session.segments_emitted(), 2);
    assert_eq!(*held.lock().unwrap(), Some(2));
    assert!(camera.is_released());
    assert_eq!(session.source(), Some(MediaSource::ScreenShare));
    assert_eq!(devices.active_devices(), 2);

    let state = session.status().get().await;
    assert_eq!(state.phase, SessionPhase::Recording);
    assert_eq!(state.source_switches, 1);

    tokio::time::sleep(Duration::from_millis(450)).await;
    let summary = session.finish().await;

    assert_eq!(summary.total, 4);
    assert!(summary.all_uploaded());
    assert_eq!(
        received_indices(&store).await,
        vec![Some(0), Some(1), Some(2), Some(3)]
    );
    assert_eq!(devices.active_devices(), 0);
}

#[tokio::test]
async fn test_screen_share_without_microphone_when_disabled() {
    let (base, _store) = spawn_sink().await;
    let devices = SyntheticDevices::new();
    let mut session = session_with_options(
        &base,
        Arc::new(devices.clone()),
        SessionOptions {
            screen_share_audio: false,
            ..options()
        },
    );

    session.start().await.unwrap();
    session.switch_source(MediaSource::ScreenShare).await.unwrap();

    let stream = session.stream().unwrap().clone();
    assert!(!stream.has_track(TrackKind::Audio));
    assert!(stream.has_track(TrackKind::Video));
    assert_eq!(devices.active_devices(), 1);

    session.finish().await;
    assert_eq!(devices.active_devices(), 0);
}

#[tokio::test]
async fn test_denied_screen_share_keeps_recording_camera() {
    let (base, store) = spawn_sink().await;
    let devices = SyntheticDevices::new().with_display(Permission::Denied);
    let mut session = session_with(&base, Arc::new(devices.clone()));

    session.start().await.unwrap();
    let camera = session.stream().unwrap().clone();

    let err = session
        .switch_source(MediaSource::ScreenShare)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Device(DeviceError::PermissionDenied(_))
    ));

    assert!(session.is_recording());
    assert!(!camera.is_released());
    assert_eq!(session.source(), Some(MediaSource::CameraAndMicrophone));
    assert_eq!(devices.active_devices(), 2);

    let state = session.status().get().await;
    assert_eq!(state.phase, SessionPhase::Recording);
    assert!(state.last_error.is_some());

    tokio::time::sleep(Duration::from_millis(450)).await;
    let summary = session.finish().await;

    // Flush 0 from the aborted switch, then 1 on a timer and final 2.
    assert_eq!(summary.total, 3);
    assert_eq!(received_indices(&store).await, vec![Some(0), Some(1), Some(2)]);
}

#[tokio::test]
async fn test_denied_camera_fails_start() {
    let (base, store) = spawn_sink().await;
    let devices = SyntheticDevices::new().with_camera(Permission::Denied);
    let mut session = session_with(&base, Arc::new(devices.clone()));

    let err = session.start().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Device(DeviceError::PermissionDenied(_))
    ));
    assert!(!session.is_recording());
    assert!(session.stream().is_none());
    assert_eq!(devices.requests(), 1);
    assert_eq!(devices.active_devices(), 0);

    let state = session.status().get().await;
    assert_eq!(state.phase, SessionPhase::Error);
    assert!(store.room(ROOM).await.is_none());
}

#[tokio::test]
async fn test_failed_uploads_do_not_stop_recording() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let devices = SyntheticDevices::new();
    let mut session = session_with(&base, Arc::new(devices.clone()));

    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(750)).await;
    assert!(session.is_recording());
    assert_eq!(session.segments_emitted(), 2);

    let summary = session.finish().await;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.failed_indices, vec![0, 1, 2]);
    assert_eq!(devices.active_devices(), 0);
}

#[tokio::test]
async fn test_identity_confirmation() {
    let (base, store) = spawn_sink().await;
    let session = session_with(&base, Arc::new(SyntheticDevices::new()));

    let err = session
        .confirm_identity(&SyntheticFeed::empty())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Capture(CaptureError::NoFrame)));
    assert!(store.room(ROOM).await.is_none());

    session
        .confirm_identity(&SyntheticFeed::with_test_pattern(320, 240))
        .await
        .unwrap();
    assert_eq!(store.room(ROOM).await.unwrap().images.len(), 1);
}

#[tokio::test]
async fn test_track_toggles_follow_live_stream() {
    let (base, _store) = spawn_sink().await;
    let mut session = session_with(&base, Arc::new(SyntheticDevices::new()));

    assert!(!session.set_audio_enabled(false));

    session.start().await.unwrap();
    assert!(session.set_audio_enabled(false));
    assert!(session.set_video_enabled(false));

    let stream = session.stream().unwrap().clone();
    assert!(stream.tracks().iter().all(|t| !t.is_enabled()));
    assert!(stream.is_live());

    session.pause().await;
    assert_eq!(session.status().get().await.phase, SessionPhase::Paused);
    session.resume().await;
    assert_eq!(session.status().get().await.phase, SessionPhase::Recording);

    session.finish().await;
    assert!(!session.set_video_enabled(true));
}

#[tokio::test]
async fn test_dropping_session_releases_devices() {
    let (base, _store) = spawn_sink().await;
    let devices = SyntheticDevices::new();
    let mut session = session_with(&base, Arc::new(devices.clone()));

    session.start().await.unwrap();
    assert_eq!(devices.active_devices(), 2);

    drop(session);
    assert_eq!(devices.active_devices(), 0);
}
