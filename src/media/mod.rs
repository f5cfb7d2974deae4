//! Capture devices, live streams and still frames.
//!
//! The platform capture API sits behind [`MediaDevices`], [`MediaEncoder`] and
//! [`VideoFeed`]; everything else in the crate only sees owned [`LiveStream`]s.

pub mod devices;
pub mod encoder;
pub mod frame;
pub mod stream;
pub mod synthetic;
pub mod track_control;

pub use devices::{release, DeviceAcquisition, DeviceError, MediaConstraints, MediaDevices};
pub use encoder::{EncodedFeed, EncoderError, MediaEncoder};
pub use frame::{capture_frame, CaptureError, FrameCapture, StillImage, VideoFeed, VideoFrame};
pub use stream::{LiveStream, MediaSource, MediaTrack, TrackDevice, TrackKind};
pub use track_control::{set_audio_enabled, set_video_enabled};
