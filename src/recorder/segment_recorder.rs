//! Timed, chunked recorder bound to one live stream.
//!
//! `idle -> recording <-> paused -> stopped`. A background task owns the
//! encoder feed and cuts a [`Segment`] every interval of recording time; the
//! handle only sends it commands. `stopped` is terminal: recording again
//! (e.g. after a source switch) needs a new recorder.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::format::{negotiate_format, DEFAULT_FORMAT_PREFERENCES};
use super::segment::{Segment, SequenceCounter};
use crate::media::{EncoderError, LiveStream, MediaEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl RecorderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
            RecorderState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("No supported recording format (tried: {0})")]
    NoSupportedFormat(String),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("Recording interval must be greater than zero")]
    InvalidInterval,
    #[error("Recorder is {0}, nothing to stop")]
    NotActive(RecorderState),
    #[error("Recorder task ended before flushing its final segment")]
    TaskEnded,
}

#[derive(Debug, Clone)]
pub struct RecorderOptions {
    /// Candidate formats in preference order.
    pub formats: Vec<String>,
    /// Capacity of the segment channel handed out by [`SegmentRecorder::segments`].
    pub channel_capacity: usize,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            formats: DEFAULT_FORMAT_PREFERENCES
                .iter()
                .map(|f| f.to_string())
                .collect(),
            channel_capacity: 8,
        }
    }
}

impl From<&crate::config::RecorderConfig> for RecorderOptions {
    fn from(config: &crate::config::RecorderConfig) -> Self {
        Self {
            formats: config.formats.clone(),
            channel_capacity: config.channel_capacity,
        }
    }
}

enum Command {
    Pause,
    Resume,
    ReplaceConsumer(mpsc::Sender<Segment>),
    Stop(oneshot::Sender<Segment>),
}

pub struct SegmentRecorder {
    room_id: String,
    stream: Arc<LiveStream>,
    encoder: Arc<dyn MediaEncoder>,
    counter: SequenceCounter,
    mime_type: Option<String>,
    tried_formats: Vec<String>,
    channel_capacity: usize,
    state: RecorderState,
    pending_consumer: Option<mpsc::Sender<Segment>>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl SegmentRecorder {
    /// Bind a recorder to `stream`, negotiating the format up front.
    ///
    /// `counter` must be the room's shared counter so numbering continues
    /// across recorders.
    pub fn new(
        room_id: impl Into<String>,
        stream: Arc<LiveStream>,
        encoder: Arc<dyn MediaEncoder>,
        counter: SequenceCounter,
        options: &RecorderOptions,
    ) -> Self {
        let mime_type = negotiate_format(encoder.as_ref(), &options.formats);

        Self {
            room_id: room_id.into(),
            stream,
            encoder,
            counter,
            mime_type,
            tried_formats: options.formats.clone(),
            channel_capacity: options.channel_capacity.max(1),
            state: RecorderState::Idle,
            pending_consumer: None,
            commands: None,
            task: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// Negotiated format; `None` means the platform default.
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn stream(&self) -> &Arc<LiveStream> {
        &self.stream
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Attach the segment consumer, replacing any previous one.
    ///
    /// A replaced consumer's receiver is closed; segments it had not taken yet
    /// stay in its channel. Segments are delivered in emission order.
    pub fn segments(&mut self) -> mpsc::Receiver<Segment> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        match self.state {
            RecorderState::Idle => self.pending_consumer = Some(tx),
            RecorderState::Recording | RecorderState::Paused => {
                self.send(Command::ReplaceConsumer(tx));
            }
            RecorderState::Stopped => {}
        }

        rx
    }

    /// Begin recording, emitting one segment per `interval` of recording time.
    ///
    /// No-op unless the recorder is idle.
    pub fn start(&mut self, interval: Duration) -> Result<(), RecorderError> {
        if self.state != RecorderState::Idle {
            debug!("start() ignored, recorder is {}", self.state);
            return Ok(());
        }
        if interval.is_zero() {
            return Err(RecorderError::InvalidInterval);
        }

        let feed = self
            .encoder
            .open(&self.stream, self.mime_type.as_deref())
            .map_err(|e| match e {
                EncoderError::Unsupported(_) => {
                    RecorderError::NoSupportedFormat(self.describe_tried_formats())
                }
                other => RecorderError::Encoder(other),
            })?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = RecorderTask {
            room_id: self.room_id.clone(),
            mime_type: feed.mime_type,
            counter: self.counter.clone(),
            interval,
            feed: feed.data,
            feed_open: true,
            commands: command_rx,
            consumer: self.pending_consumer.take(),
            backlog: VecDeque::new(),
            buffer: Vec::new(),
            paused: false,
            deadline: Instant::now() + interval,
            remaining: interval,
        };

        info!(
            "Recording room {} from {} stream {} every {:?}",
            self.room_id,
            self.stream.source().as_str(),
            self.stream.id(),
            interval
        );

        self.task = Some(tokio::spawn(task.run()));
        self.commands = Some(command_tx);
        self.state = RecorderState::Recording;
        Ok(())
    }

    /// No-op unless recording.
    pub fn pause(&mut self) {
        if self.state == RecorderState::Recording {
            self.send(Command::Pause);
            self.state = RecorderState::Paused;
        }
    }

    /// No-op unless paused.
    pub fn resume(&mut self) {
        if self.state == RecorderState::Paused {
            self.send(Command::Resume);
            self.state = RecorderState::Recording;
        }
    }

    /// Stop recording and return the flush of everything captured since the
    /// last emitted segment (possibly empty).
    ///
    /// Segments still waiting for the consumer are delivered before this
    /// returns, so the consumer must keep draining its receiver meanwhile.
    pub async fn stop(&mut self) -> Result<Segment, RecorderError> {
        let previous = self.state;
        self.state = RecorderState::Stopped;

        match previous {
            RecorderState::Recording | RecorderState::Paused => {}
            RecorderState::Idle | RecorderState::Stopped => {
                return Err(RecorderError::NotActive(previous));
            }
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Stop(reply_tx));
        self.commands = None;

        let final_segment = reply_rx.await.map_err(|_| RecorderError::TaskEnded)?;

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Recorder task for room {} failed: {}", self.room_id, e);
            }
        }

        info!(
            "Recorder for room {} stopped, final segment {} ({} bytes)",
            self.room_id,
            final_segment.sequence_index,
            final_segment.len()
        );
        Ok(final_segment)
    }

    fn send(&self, command: Command) {
        if let Some(commands) = &self.commands {
            if commands.send(command).is_err() {
                warn!("Recorder task for room {} is gone", self.room_id);
            }
        }
    }

    fn describe_tried_formats(&self) -> String {
        if self.tried_formats.is_empty() {
            "platform default".to_string()
        } else {
            format!("{}, platform default", self.tried_formats.join(", "))
        }
    }
}

impl Drop for SegmentRecorder {
    fn drop(&mut self) {
        if matches!(self.state, RecorderState::Recording | RecorderState::Paused) {
            warn!(
                "Recorder for room {} dropped while {}, unflushed data is lost",
                self.room_id, self.state
            );
        }
    }
}

struct RecorderTask {
    room_id: String,
    mime_type: String,
    counter: SequenceCounter,
    interval: Duration,
    feed: mpsc::Receiver<Vec<u8>>,
    feed_open: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    consumer: Option<mpsc::Sender<Segment>>,
    backlog: VecDeque<Segment>,
    buffer: Vec<u8>,
    paused: bool,
    deadline: Instant,
    /// Recording time left in the current interval while paused.
    remaining: Duration,
}

impl RecorderTask {
    async fn run(mut self) {
        let timer = tokio::time::sleep_until(self.deadline);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                chunk = self.feed.recv(), if self.feed_open => match chunk {
                    Some(bytes) => {
                        if !self.paused {
                            self.buffer.extend_from_slice(&bytes);
                        }
                    }
                    None => {
                        warn!("Encoder feed for room {} ended", self.room_id);
                        self.feed_open = false;
                    }
                },

                command = self.commands.recv() => match command {
                    Some(Command::Pause) => {
                        self.remaining = self.deadline.saturating_duration_since(Instant::now());
                        self.paused = true;
                        debug!("Recorder paused with {:?} left in interval", self.remaining);
                    }
                    Some(Command::Resume) => {
                        self.deadline = Instant::now() + self.remaining;
                        timer.as_mut().reset(self.deadline);
                        self.paused = false;
                        debug!("Recorder resumed");
                    }
                    Some(Command::ReplaceConsumer(consumer)) => {
                        debug!("Segment consumer replaced");
                        self.consumer = Some(consumer);
                    }
                    Some(Command::Stop(reply)) => {
                        let final_segment = self.finish().await;
                        let _ = reply.send(final_segment);
                        return;
                    }
                    None => {
                        debug!("Recorder handle for room {} dropped", self.room_id);
                        return;
                    }
                },

                () = &mut timer, if !self.paused => {
                    let segment = self.cut(false);
                    self.deliver(segment);
                    self.deadline += self.interval;
                    timer.as_mut().reset(self.deadline);
                },

                permit = reserve_slot(self.consumer.clone()), if !self.backlog.is_empty() => match permit {
                    Some(permit) => {
                        if let Some(segment) = self.backlog.pop_front() {
                            permit.send(segment);
                        }
                    }
                    None => {
                        warn!(
                            "Segment consumer for room {} closed, dropping {} queued segments",
                            self.room_id,
                            self.backlog.len()
                        );
                        self.backlog.clear();
                        self.consumer = None;
                    }
                },
            }
        }
    }

    fn cut(&mut self, is_final: bool) -> Segment {
        let segment = Segment {
            room_id: self.room_id.clone(),
            sequence_index: self.counter.next_index(),
            mime_type: self.mime_type.clone(),
            data: std::mem::take(&mut self.buffer),
            produced_at: Utc::now(),
            is_final,
        };
        debug!(
            "Segment {} cut for room {} ({} bytes)",
            segment.sequence_index,
            self.room_id,
            segment.len()
        );
        segment
    }

    fn deliver(&mut self, segment: Segment) {
        let Some(consumer) = &self.consumer else {
            warn!(
                "No segment consumer attached, dropping segment {}",
                segment.sequence_index
            );
            return;
        };

        if !self.backlog.is_empty() {
            self.backlog.push_back(segment);
            return;
        }

        match consumer.try_send(segment) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(segment)) => {
                debug!(
                    "Segment consumer busy, holding segment {}",
                    segment.sequence_index
                );
                self.backlog.push_back(segment);
            }
            Err(mpsc::error::TrySendError::Closed(segment)) => {
                warn!(
                    "Segment consumer closed, dropping segment {}",
                    segment.sequence_index
                );
                self.consumer = None;
            }
        }
    }

    async fn finish(&mut self) -> Segment {
        while let Ok(bytes) = self.feed.try_recv() {
            if !self.paused {
                self.buffer.extend_from_slice(&bytes);
            }
        }
        self.feed.close();

        if let Some(consumer) = &self.consumer {
            while let Some(segment) = self.backlog.pop_front() {
                if consumer.send(segment).await.is_err() {
                    warn!("Segment consumer closed during stop");
                    break;
                }
            }
        }
        self.backlog.clear();

        self.cut(true)
    }
}

async fn reserve_slot(consumer: Option<mpsc::Sender<Segment>>) -> Option<mpsc::OwnedPermit<Segment>> {
    match consumer {
        Some(consumer) => consumer.reserve_owned().await.ok(),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::synthetic::{SyntheticDevices, SyntheticEncoder};
    use crate::media::DeviceAcquisition;

    async fn camera_stream() -> Arc<LiveStream> {
        let acquisition = DeviceAcquisition::new(Arc::new(SyntheticDevices::new()));
        Arc::new(acquisition.acquire_camera_and_microphone().await.unwrap())
    }

    fn recorder(stream: Arc<LiveStream>, counter: SequenceCounter) -> SegmentRecorder {
        SegmentRecorder::new(
            "room-test",
            stream,
            Arc::new(SyntheticEncoder::default()),
            counter,
            &RecorderOptions::default(),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<Segment>) -> Vec<Segment> {
        let mut segments = Vec::new();
        while let Ok(segment) = rx.try_recv() {
            segments.push(segment);
        }
        segments
    }

    #[tokio::test(start_paused = true)]
    async fn test_twenty_five_seconds_at_ten_second_interval() {
        let mut recorder = recorder(camera_stream().await, SequenceCounter::new());
        let mut rx = recorder.segments();

        recorder.start(Duration::from_secs(10)).unwrap();
        assert!(recorder.is_recording());

        tokio::time::sleep(Duration::from_secs(25)).await;
        let timed = drain(&mut rx);
        assert_eq!(timed.len(), 2);
        assert!(timed.iter().all(|s| !s.is_empty() && !s.is_final));

        let last = recorder.stop().await.unwrap();
        assert!(last.is_final);
        assert_eq!(recorder.state(), RecorderState::Stopped);

        let indices: Vec<u64> = timed
            .iter()
            .chain(std::iter::once(&last))
            .map(|s| s.sequence_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(last.mime_type, "video/webm;codecs=vp8,opus");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_suppresses_emission_and_keeps_interval_clock() {
        let mut recorder = recorder(camera_stream().await, SequenceCounter::new());
        let mut rx = recorder.segments();
        recorder.start(Duration::from_secs(10)).unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        recorder.pause();
        assert_eq!(recorder.state(), RecorderState::Paused);
        assert!(!recorder.is_recording());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(drain(&mut rx).is_empty());

        recorder.resume();
        tokio::time::sleep(Duration::from_millis(5_900)).await;
        assert!(drain(&mut rx).is_empty(), "no segment right after resume");

        tokio::time::sleep(Duration::from_millis(200)).await;
        let segments = drain(&mut rx);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].sequence_index, 0);

        recorder.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_paused_flushes() {
        let mut recorder = recorder(camera_stream().await, SequenceCounter::new());
        let _rx = recorder.segments();
        recorder.start(Duration::from_secs(10)).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        recorder.pause();
        let last = recorder.stop().await.unwrap();
        assert_eq!(last.sequence_index, 0);
        assert!(!last.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_transitions_are_noops() {
        let mut recorder = recorder(camera_stream().await, SequenceCounter::new());

        recorder.pause();
        recorder.resume();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(matches!(
            recorder.stop().await,
            Err(RecorderError::NotActive(RecorderState::Idle))
        ));
        assert_eq!(recorder.state(), RecorderState::Stopped);

        // Stopped is terminal.
        recorder.start(Duration::from_secs(1)).unwrap();
        assert_eq!(recorder.state(), RecorderState::Stopped);
        assert!(matches!(
            recorder.stop().await,
            Err(RecorderError::NotActive(RecorderState::Stopped))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_does_not_restart() {
        let counter = SequenceCounter::new();
        let mut recorder = recorder(camera_stream().await, counter.clone());
        let mut rx = recorder.segments();
        recorder.start(Duration::from_secs(10)).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        recorder.start(Duration::from_secs(1)).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(drain(&mut rx).len(), 1);
        recorder.stop().await.unwrap();
        assert_eq!(counter.peek(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_consumer_replaces_old() {
        let mut recorder = recorder(camera_stream().await, SequenceCounter::new());
        let mut first = recorder.segments();
        recorder.start(Duration::from_secs(10)).unwrap();

        let mut second = recorder.segments();
        tokio::time::sleep(Duration::from_millis(10_100)).await;

        assert!(first.recv().await.is_none());
        let segment = second.recv().await.unwrap();
        assert_eq!(segment.sequence_index, 0);

        recorder.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_does_not_stall_timer() {
        let stream = camera_stream().await;
        let mut recorder = SegmentRecorder::new(
            "room-test",
            stream,
            Arc::new(SyntheticEncoder::default()),
            SequenceCounter::new(),
            &RecorderOptions {
                channel_capacity: 1,
                ..RecorderOptions::default()
            },
        );
        let mut rx = recorder.segments();
        recorder.start(Duration::from_secs(10)).unwrap();

        // Nobody reads for three intervals.
        tokio::time::sleep(Duration::from_secs(35)).await;

        let collector = tokio::spawn(async move {
            let mut indices = Vec::new();
            while let Some(segment) = rx.recv().await {
                indices.push(segment.sequence_index);
            }
            indices
        });

        let last = recorder.stop().await.unwrap();
        assert_eq!(last.sequence_index, 3);

        drop(recorder);
        assert_eq!(collector.await.unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_continues_across_recorders() {
        let counter = SequenceCounter::new();
        let stream = camera_stream().await;

        let mut first = recorder(stream.clone(), counter.clone());
        let mut rx = first.segments();
        first.start(Duration::from_secs(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let final_first = first.stop().await.unwrap();

        let mut second = recorder(stream, counter.clone());
        let mut rx2 = second.segments();
        second.start(Duration::from_secs(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let final_second = second.stop().await.unwrap();

        let mut indices: Vec<u64> = drain(&mut rx).iter().map(|s| s.sequence_index).collect();
        indices.push(final_first.sequence_index);
        indices.extend(drain(&mut rx2).iter().map(|s| s.sequence_index));
        indices.push(final_second.sequence_index);
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_platform_without_any_format_cannot_start() {
        let stream = camera_stream().await;
        let mut recorder = SegmentRecorder::new(
            "room-test",
            stream,
            Arc::new(SyntheticEncoder::new(["video/quicktime"]).without_default()),
            SequenceCounter::new(),
            &RecorderOptions::default(),
        );
        assert_eq!(recorder.mime_type(), None);

        let err = recorder.start(Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, RecorderError::NoSupportedFormat(_)));
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_rejected() {
        let mut recorder = recorder(camera_stream().await, SequenceCounter::new());
        assert!(matches!(
            recorder.start(Duration::ZERO),
            Err(RecorderError::InvalidInterval)
        ));
    }
}
