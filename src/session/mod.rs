//! Interview room session.
//!
//! Drives device acquisition, the segment recorder and the uploader for one
//! room, including source switches mid-recording.

pub mod interview;
pub mod status;

pub use interview::{InterviewSession, SessionError, SessionOptions};
pub use status::{SessionPhase, SessionState, SessionStatusHandle};
