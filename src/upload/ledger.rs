//! Per-chunk upload outcomes for one room.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::recorder::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Uploaded,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Uploaded => "uploaded",
            ChunkStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub sequence_index: u64,
    pub bytes: usize,
    pub is_final: bool,
    pub status: ChunkStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub total: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub pending: usize,
    pub failed_indices: Vec<u64>,
}

impl UploadSummary {
    pub fn all_uploaded(&self) -> bool {
        self.uploaded == self.total
    }
}

/// Keyed by sequence index, so out-of-order completions land in place.
#[derive(Clone, Default)]
pub struct UploadLedger {
    inner: Arc<Mutex<BTreeMap<u64, ChunkRecord>>>,
}

impl UploadLedger {
    pub async fn mark_pending(&self, segment: &Segment) {
        let mut chunks = self.inner.lock().await;
        chunks.insert(
            segment.sequence_index,
            ChunkRecord {
                sequence_index: segment.sequence_index,
                bytes: segment.len(),
                is_final: segment.is_final,
                status: ChunkStatus::Pending,
            },
        );
    }

    pub async fn set_status(&self, sequence_index: u64, status: ChunkStatus) {
        let mut chunks = self.inner.lock().await;
        if let Some(record) = chunks.get_mut(&sequence_index) {
            record.status = status;
        }
    }

    pub async fn get(&self, sequence_index: u64) -> Option<ChunkRecord> {
        self.inner.lock().await.get(&sequence_index).cloned()
    }

    /// All records in sequence order.
    pub async fn records(&self) -> Vec<ChunkRecord> {
        self.inner.lock().await.values().cloned().collect()
    }

    pub async fn summary(&self) -> UploadSummary {
        let chunks = self.inner.lock().await;
        let mut summary = UploadSummary {
            total: chunks.len(),
            ..UploadSummary::default()
        };

        for record in chunks.values() {
            match record.status {
                ChunkStatus::Pending => summary.pending += 1,
                ChunkStatus::Uploaded => summary.uploaded += 1,
                ChunkStatus::Failed => {
                    summary.failed += 1;
                    summary.failed_indices.push(record.sequence_index);
                }
            }
        }

        summary
    }
}
