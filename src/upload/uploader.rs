//! Drains recorder segment channels into the upload client.
//!
//! Each segment is uploaded on its own task without waiting for earlier
//! uploads, so completions may arrive out of order; the backend and the
//! ledger both rely on `sequence_index` for ordering. A failed upload is
//! recorded and logged, never surfaced to the recorder.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::client::UploadClient;
use super::ledger::{ChunkStatus, UploadLedger, UploadSummary};
use crate::recorder::Segment;

#[derive(Clone)]
pub struct SegmentUploader {
    client: UploadClient,
    room_id: Arc<str>,
    user_id: Option<Arc<str>>,
    ledger: UploadLedger,
    tracker: TaskTracker,
}

impl SegmentUploader {
    pub fn new(client: UploadClient, room_id: &str, user_id: Option<&str>) -> Self {
        Self {
            client,
            room_id: Arc::from(room_id),
            user_id: user_id.map(Arc::from),
            ledger: UploadLedger::default(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn ledger(&self) -> &UploadLedger {
        &self.ledger
    }

    pub fn client(&self) -> &UploadClient {
        &self.client
    }

    /// Upload everything arriving on `segments` until the recorder closes it.
    pub fn attach(&self, mut segments: mpsc::Receiver<Segment>) {
        let uploader = self.clone();
        self.tracker.spawn(async move {
            while let Some(segment) = segments.recv().await {
                uploader.dispatch(segment).await;
            }
            debug!("Segment channel for room {} closed", uploader.room_id);
        });
    }

    /// Start uploading one segment in the background.
    pub async fn dispatch(&self, segment: Segment) {
        self.ledger.mark_pending(&segment).await;
        let uploader = self.clone();
        self.tracker.spawn(async move {
            uploader.send(&segment).await;
        });
    }

    /// Wait for every attached channel and in-flight upload to finish.
    pub async fn finish(&self) -> UploadSummary {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();

        let summary = self.ledger.summary().await;
        info!(
            "Uploads for room {} settled: {}/{} uploaded, failed chunks {:?}",
            self.room_id, summary.uploaded, summary.total, summary.failed_indices
        );
        summary
    }

    async fn send(&self, segment: &Segment) -> bool {
        let uploaded = self
            .client
            .upload_segment(
                segment,
                &self.room_id,
                segment.sequence_index,
                self.user_id.as_deref(),
            )
            .await;

        let status = if uploaded {
            ChunkStatus::Uploaded
        } else {
            ChunkStatus::Failed
        };
        self.ledger.set_status(segment.sequence_index, status).await;
        uploaded
    }
}
