use serde::{Deserialize, Serialize};
use std::fmt;

/// Required head orientation during enrollment, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pose {
    Front,
    Left,
    Right,
    Up,
    Down,
}

impl Pose {
    /// All poses in the order they are acquired.
    pub const ALL: [Pose; 5] = [Pose::Front, Pose::Left, Pose::Right, Pose::Up, Pose::Down];

    /// Number of poses in the acquisition protocol.
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this pose in [`Pose::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Pose at `index`, or `None` past the last pose.
    pub fn from_index(index: usize) -> Option<Pose> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Pose::Front => "front",
            Pose::Left => "left",
            Pose::Right => "right",
            Pose::Up => "up",
            Pose::Down => "down",
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque reference to a frame stored by the capture device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameHandle(String);

impl FrameHandle {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One accepted capture. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedImage {
    pub reference: FrameHandle,
    pub captured_at_pose_index: usize,
    pub sequence_index: usize,
}

impl CapturedImage {
    /// Pose this image was captured under.
    pub fn pose(&self) -> Pose {
        Pose::from_index(self.captured_at_pose_index).unwrap_or(Pose::Down)
    }
}

/// Per-tick output of the detector capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetectionSample {
    pub face_detected: bool,
    pub is_aligned: bool,
}

impl DetectionSample {
    /// Sample reported when the detector is unavailable for a tick.
    pub const NOT_DETECTED: DetectionSample = DetectionSample {
        face_detected: false,
        is_aligned: false,
    };

    pub fn new(face_detected: bool, is_aligned: bool) -> Self {
        Self {
            face_detected,
            is_aligned,
        }
    }

    /// A sample is capture-eligible only when a face is both present and aligned.
    pub fn is_capture_eligible(&self) -> bool {
        self.face_detected && self.is_aligned
    }
}

/// Bounding box for a located face, in coordinates normalized to the frame (0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Lifecycle phase of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Not running; the count may be zero or partial.
    Idle,
    /// Actively attempting captures.
    Running,
    /// Handed off (or pending handoff) to the submission collaborator.
    Completed,
    /// Discarded by the user.
    Cancelled,
}

impl Phase {
    pub fn is_running(self) -> bool {
        self == Phase::Running
    }

    /// Completed and cancelled sessions accept no further captures.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Cancelled)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Completed => "completed",
            Phase::Cancelled => "cancelled",
        })
    }
}
