use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::format::extension_for;

/// One finished time slice of recorded media.
#[derive(Debug, Clone)]
pub struct Segment {
    pub room_id: String,
    pub sequence_index: u64,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub produced_at: DateTime<Utc>,
    /// Set on the flush returned by `stop()`.
    pub is_final: bool,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn file_name(&self) -> String {
        format!(
            "chunk-{}.{}",
            self.sequence_index,
            extension_for(&self.mime_type)
        )
    }
}

/// Room-scoped segment numbering shared by every recorder of a session.
///
/// Indices start at 0 and never repeat, including across source switches.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    next: Arc<AtomicU64>,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next index.
    pub fn next_index(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Index the next segment will get; equals the number of segments numbered so far.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}
