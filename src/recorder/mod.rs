pub mod format;
pub mod segment;
pub mod segment_recorder;

pub use format::{negotiate_format, DEFAULT_FORMAT_PREFERENCES};
pub use segment::{Segment, SequenceCounter};
pub use segment_recorder::{RecorderError, RecorderOptions, RecorderState, SegmentRecorder};
