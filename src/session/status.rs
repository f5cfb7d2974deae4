//! Session status types and shared state handle.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::media::MediaSource;

/// Phase of an interview room's capture lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Recording,
    Paused,
    Switching,
    Finishing,
    Completed,
    Error,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Switching => "switching",
            Self::Finishing => "finishing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Current session state, readable by whatever drives the UI.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub source: Option<MediaSource>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub source_switches: u32,
    pub last_error: Option<String>,
}

impl SessionState {
    /// Seconds since recording started.
    pub fn duration_seconds(&self) -> Option<u64> {
        self.started_at.map(|started| {
            let elapsed = chrono::Utc::now() - started;
            elapsed.num_seconds().max(0) as u64
        })
    }
}

#[derive(Clone, Default)]
pub struct SessionStatusHandle {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionStatusHandle {
    pub async fn get(&self) -> SessionState {
        self.inner.lock().await.clone()
    }

    pub async fn start_recording(&self, source: MediaSource) {
        let mut state = self.inner.lock().await;
        state.phase = SessionPhase::Recording;
        state.source = Some(source);
        state.started_at = Some(chrono::Utc::now());
        state.source_switches = 0;
        state.last_error = None;
    }

    pub async fn switched_to(&self, source: MediaSource) {
        let mut state = self.inner.lock().await;
        state.phase = SessionPhase::Recording;
        state.source = Some(source);
        state.source_switches += 1;
    }

    pub async fn set_phase(&self, phase: SessionPhase) {
        let mut state = self.inner.lock().await;
        state.phase = phase;
    }

    pub async fn set_error(&self, error: String) {
        let mut state = self.inner.lock().await;
        state.phase = SessionPhase::Error;
        state.last_error = Some(error);
    }

    /// Keep the phase but remember a non-fatal failure.
    pub async fn note_error(&self, error: String) {
        let mut state = self.inner.lock().await;
        state.last_error = Some(error);
    }

    pub async fn complete(&self) {
        let mut state = self.inner.lock().await;
        state.phase = SessionPhase::Completed;
    }
}
