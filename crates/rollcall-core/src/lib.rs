//! rollcall-core — Face-enrollment capture logic.
//!
//! Pose sequencing, the detection-and-alignment gate and the capture
//! session state machine. Nothing here touches a device or a clock; the
//! daemon drives these types from its periodic tasks.

pub mod alignment;
pub mod gate;
pub mod guidance;
pub mod pose;
pub mod session;
pub mod types;

pub use alignment::{AlignmentCheck, TargetRegion};
pub use gate::{DetectionGate, TaggedSample};
pub use guidance::Guidance;
pub use pose::PoseSequencer;
pub use session::{
    CaptureOutcome, CaptureSession, PolicyError, SessionError, SessionPolicy, SessionSnapshot,
};
pub use types::{BoundingBox, CapturedImage, DetectionSample, FrameHandle, Phase, Pose};
