//! Interview room capture orchestrator.
//!
//! Owns the single live stream and the recorder feeding on it, keeps the
//! room's segment counter across source switches and hands every segment to
//! the uploader:
//! acquire camera → record → (switch source)* → stop → upload final → release

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::status::{SessionPhase, SessionStatusHandle};
use crate::config::Config;
use crate::media::{
    self, CaptureError, DeviceAcquisition, DeviceError, FrameCapture, LiveStream, MediaEncoder,
    MediaSource, VideoFeed,
};
use crate::recorder::{RecorderError, RecorderOptions, SegmentRecorder, SequenceCounter};
use crate::upload::{SegmentUploader, UploadClient, UploadSummary};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot access capture devices: {0}")]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error("Identity capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("Identity image upload failed")]
    IdentityUploadFailed,
    #[error("Session is already recording")]
    AlreadyRecording,
    #[error("Session is not recording")]
    NotRecording,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub interval: Duration,
    pub recorder: RecorderOptions,
    pub jpeg_quality: u8,
    /// Add a separately acquired microphone track to screen shares.
    pub screen_share_audio: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10_000),
            recorder: RecorderOptions::default(),
            jpeg_quality: media::frame::DEFAULT_JPEG_QUALITY,
            screen_share_audio: true,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            interval: Duration::from_millis(config.recorder.interval_ms),
            recorder: RecorderOptions::from(&config.recorder),
            jpeg_quality: config.capture.jpeg_quality,
            screen_share_audio: config.capture.screen_share_audio,
        }
    }
}

pub struct InterviewSession {
    room_id: String,
    acquisition: DeviceAcquisition,
    encoder: Arc<dyn MediaEncoder>,
    uploader: SegmentUploader,
    counter: SequenceCounter,
    options: SessionOptions,
    status: SessionStatusHandle,
    stream: Option<Arc<LiveStream>>,
    recorder: Option<SegmentRecorder>,
}

impl InterviewSession {
    pub fn new(
        room_id: impl Into<String>,
        user_id: Option<&str>,
        acquisition: DeviceAcquisition,
        encoder: Arc<dyn MediaEncoder>,
        client: UploadClient,
        options: SessionOptions,
        status: SessionStatusHandle,
    ) -> Self {
        let room_id = room_id.into();
        let uploader = SegmentUploader::new(client, &room_id, user_id);

        Self {
            room_id,
            acquisition,
            encoder,
            uploader,
            counter: SequenceCounter::new(),
            options,
            status,
            stream: None,
            recorder: None,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn status(&self) -> &SessionStatusHandle {
        &self.status
    }

    pub fn uploader(&self) -> &SegmentUploader {
        &self.uploader
    }

    /// The stream currently feeding the recorder.
    pub fn stream(&self) -> Option<&Arc<LiveStream>> {
        self.stream.as_ref()
    }

    pub fn source(&self) -> Option<MediaSource> {
        self.stream.as_ref().map(|s| s.source())
    }

    pub fn is_recording(&self) -> bool {
        self.recorder
            .as_ref()
            .map(|r| r.is_recording())
            .unwrap_or(false)
    }

    /// Segments numbered so far, including final flushes.
    pub fn segments_emitted(&self) -> u64 {
        self.counter.peek()
    }

    /// Acquire camera and microphone and start recording.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.recorder.is_some() {
            return Err(SessionError::AlreadyRecording);
        }

        info!("Session {}: starting capture", self.room_id);
        let stream = match self.acquisition.acquire_camera_and_microphone().await {
            Ok(stream) => Arc::new(stream),
            Err(e) => {
                error!("Session {}: camera unavailable: {}", self.room_id, e);
                self.status.set_error(e.to_string()).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.begin_recording(stream.clone()) {
            stream.release();
            self.status.set_error(e.to_string()).await;
            return Err(e);
        }

        self.status
            .start_recording(MediaSource::CameraAndMicrophone)
            .await;
        Ok(())
    }

    /// Move recording to another source without breaking segment numbering.
    ///
    /// The old recorder is stopped and its final segment queued for upload
    /// before the new source is requested; the old stream is released only
    /// once the new one is live. If the new source cannot be acquired,
    /// recording resumes on the old stream and the device error is returned.
    pub async fn switch_source(&mut self, source: MediaSource) -> Result<(), SessionError> {
        let Some(mut old_recorder) = self.recorder.take() else {
            return Err(SessionError::NotRecording);
        };
        let Some(old_stream) = self.stream.clone() else {
            self.recorder = Some(old_recorder);
            return Err(SessionError::NotRecording);
        };

        info!(
            "Session {}: switching {} -> {}",
            self.room_id,
            old_stream.source().as_str(),
            source.as_str()
        );
        self.status.set_phase(SessionPhase::Switching).await;

        match old_recorder.stop().await {
            Ok(final_segment) => self.uploader.dispatch(final_segment).await,
            Err(e) => warn!("Session {}: previous recorder did not flush: {}", self.room_id, e),
        }
        drop(old_recorder);

        let acquired = match source {
            MediaSource::CameraAndMicrophone => {
                self.acquisition.acquire_camera_and_microphone().await
            }
            MediaSource::ScreenShare if self.options.screen_share_audio => {
                self.acquisition.acquire_screen_share_with_microphone().await
            }
            MediaSource::ScreenShare => self.acquisition.acquire_screen_share().await,
        };

        let new_stream = match acquired {
            Ok(stream) => Arc::new(stream),
            Err(e) => {
                warn!(
                    "Session {}: {} unavailable, continuing on {}: {}",
                    self.room_id,
                    source.as_str(),
                    old_stream.source().as_str(),
                    e
                );
                self.status.note_error(e.to_string()).await;
                self.resume_on(old_stream).await?;
                return Err(e.into());
            }
        };

        old_stream.release();
        self.stream = None;

        if let Err(e) = self.begin_recording(new_stream.clone()) {
            new_stream.release();
            self.status.set_error(e.to_string()).await;
            return Err(e);
        }

        self.status.switched_to(source).await;
        Ok(())
    }

    pub async fn pause(&mut self) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.pause();
            self.status.set_phase(SessionPhase::Paused).await;
        }
    }

    pub async fn resume(&mut self) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.resume();
            self.status.set_phase(SessionPhase::Recording).await;
        }
    }

    /// Mute or unmute the live microphone. Returns whether a track was toggled.
    pub fn set_audio_enabled(&self, enabled: bool) -> bool {
        media::set_audio_enabled(self.stream.as_deref(), enabled)
    }

    /// Blank or unblank the live video. Returns whether a track was toggled.
    pub fn set_video_enabled(&self, enabled: bool) -> bool {
        media::set_video_enabled(self.stream.as_deref(), enabled)
    }

    /// Capture the current frame of `feed` and upload it as the room's identity still.
    pub async fn confirm_identity(&self, feed: &dyn VideoFeed) -> Result<(), SessionError> {
        let still = FrameCapture::new(self.options.jpeg_quality).capture(feed)?;

        if self
            .uploader
            .client()
            .upload_still_image(&still, &self.room_id)
            .await
        {
            Ok(())
        } else {
            Err(SessionError::IdentityUploadFailed)
        }
    }

    /// Stop recording, upload the final flush, wait for outstanding uploads
    /// and release the devices.
    pub async fn finish(&mut self) -> UploadSummary {
        self.status.set_phase(SessionPhase::Finishing).await;

        if let Some(mut recorder) = self.recorder.take() {
            match recorder.stop().await {
                Ok(final_segment) => self.uploader.dispatch(final_segment).await,
                Err(e) => warn!("Session {}: recorder did not flush: {}", self.room_id, e),
            }
        }

        let summary = self.uploader.finish().await;

        media::release(self.stream.as_deref());
        self.stream = None;

        self.status.complete().await;
        info!(
            "Session {} finished: {} segments, {} failed uploads",
            self.room_id, summary.total, summary.failed
        );
        summary
    }

    fn begin_recording(&mut self, stream: Arc<LiveStream>) -> Result<(), SessionError> {
        let mut recorder = SegmentRecorder::new(
            self.room_id.clone(),
            stream.clone(),
            self.encoder.clone(),
            self.counter.clone(),
            &self.options.recorder,
        );

        self.uploader.attach(recorder.segments());
        recorder.start(self.options.interval)?;

        debug!(
            "Session {}: recorder started at segment {}",
            self.room_id,
            self.counter.peek()
        );
        self.recorder = Some(recorder);
        self.stream = Some(stream);
        Ok(())
    }

    async fn resume_on(&mut self, stream: Arc<LiveStream>) -> Result<(), SessionError> {
        if let Err(e) = self.begin_recording(stream.clone()) {
            stream.release();
            self.stream = None;
            self.status.set_error(e.to_string()).await;
            return Err(e);
        }
        self.status.set_phase(SessionPhase::Recording).await;
        Ok(())
    }
}

impl Drop for InterviewSession {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Session {} dropped, releasing stream", self.room_id);
            stream.release();
        }
    }
}
