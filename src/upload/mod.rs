pub mod client;
pub mod ledger;
pub mod uploader;

pub use client::{ImageAck, SegmentAck, UploadClient, UploadError};
pub use ledger::{ChunkRecord, ChunkStatus, UploadLedger, UploadSummary};
pub use uploader::SegmentUploader;
