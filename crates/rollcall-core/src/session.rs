//! Capture session aggregate and its state machine.
//!
//! `CaptureSession` owns everything a single enrollment run accumulates.
//! It never touches a device: the runtime asks [`CaptureSession::wants_capture`],
//! performs the device call, and feeds the result back through
//! [`CaptureSession::accept_capture`] together with the epoch it observed
//! when the attempt started.

use crate::pose::PoseSequencer;
use crate::types::{CapturedImage, FrameHandle, Phase, Pose};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TOTAL_TARGET: usize = 70;
pub const DEFAULT_MINIMUM_ACCEPTABLE: usize = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("total target must be at least 1")]
    ZeroTarget,
    #[error("minimum acceptable ({minimum}) exceeds total target ({total})")]
    MinimumExceedsTarget { minimum: usize, total: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("insufficient images: {shortfall} more needed ({captured} of {minimum} captured)")]
    InsufficientImages {
        shortfall: usize,
        captured: usize,
        minimum: usize,
    },
    #[error("cannot {action} a {from} session")]
    InvalidTransition { from: Phase, action: &'static str },
}

/// Fixed capture budget for a session.
///
/// Deserialization goes through [`SessionPolicy::new`], so a decoded policy
/// obeys the same bounds as a constructed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub struct SessionPolicy {
    total_target: usize,
    minimum_acceptable: usize,
}

impl SessionPolicy {
    pub fn new(total_target: usize, minimum_acceptable: usize) -> Result<Self, PolicyError> {
        if total_target == 0 {
            return Err(PolicyError::ZeroTarget);
        }
        if minimum_acceptable > total_target {
            return Err(PolicyError::MinimumExceedsTarget {
                minimum: minimum_acceptable,
                total: total_target,
            });
        }
        Ok(Self {
            total_target,
            minimum_acceptable,
        })
    }

    pub fn total_target(&self) -> usize {
        self.total_target
    }

    pub fn minimum_acceptable(&self) -> usize {
        self.minimum_acceptable
    }
}

#[derive(Deserialize)]
struct RawPolicy {
    total_target: usize,
    minimum_acceptable: usize,
}

impl TryFrom<RawPolicy> for SessionPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        Self::new(raw.total_target, raw.minimum_acceptable)
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            total_target: DEFAULT_TOTAL_TARGET,
            minimum_acceptable: DEFAULT_MINIMUM_ACCEPTABLE,
        }
    }
}

/// Result of feeding a device frame back into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The frame was appended. `auto_stopped` is set when it filled the budget.
    Accepted {
        image: CapturedImage,
        auto_stopped: bool,
    },
    /// The session moved on while the device call was in flight.
    Discarded,
}

/// Per-pose tally as exposed to presenters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseProgress {
    pub pose: Pose,
    pub count: usize,
    pub quota: usize,
}

/// Read-only view of a session, cheap enough to poll every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub captured_count: usize,
    pub total_target: usize,
    pub minimum_acceptable: usize,
    pub current_pose: Pose,
    pub progress_within_pose: usize,
    pub images_per_pose: usize,
    pub per_pose_counts: Vec<PoseProgress>,
}

impl SessionSnapshot {
    /// Images still missing before `complete` is allowed.
    pub fn shortfall(&self) -> usize {
        self.minimum_acceptable.saturating_sub(self.captured_count)
    }

    pub fn can_complete(&self) -> bool {
        !self.phase.is_terminal() && self.shortfall() == 0
    }
}

/// One enrollment run: counters, captured images and lifecycle phase.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    policy: SessionPolicy,
    sequencer: PoseSequencer,
    phase: Phase,
    images: Vec<CapturedImage>,
    per_pose: [usize; Pose::COUNT],
    epoch: u64,
}

impl CaptureSession {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            sequencer: PoseSequencer::new(policy.total_target()),
            phase: Phase::Idle,
            images: Vec::with_capacity(policy.total_target()),
            per_pose: [0; Pose::COUNT],
            epoch: 0,
        }
    }

    /// A fresh idle session with the same policy.
    ///
    /// The epoch carries on from this session so that results issued
    /// against it can never be mistaken for results of the new one.
    pub fn renew(&self) -> Self {
        Self {
            epoch: self.epoch + 1,
            ..Self::new(self.policy)
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn sequencer(&self) -> &PoseSequencer {
        &self.sequencer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn captured_count(&self) -> usize {
        self.images.len()
    }

    pub fn captured_images(&self) -> &[CapturedImage] {
        &self.images
    }

    pub fn per_pose_count(&self, pose: Pose) -> usize {
        self.per_pose[pose.index()]
    }

    pub fn current_pose(&self) -> Pose {
        self.sequencer.pose_at(self.captured_count())
    }

    /// Changes whenever an in-flight device result must be thrown away.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn at_target(&self) -> bool {
        self.captured_count() >= self.policy.total_target()
    }

    /// Whether the capture loop should attempt a device call on this tick.
    pub fn wants_capture(&self) -> bool {
        self.is_running() && !self.at_target()
    }

    /// `Idle → Running`. A no-op while already running.
    ///
    /// Starting with a full budget settles straight back to `Idle`.
    pub fn start(&mut self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Running => Ok(()),
            Phase::Idle => {
                if self.at_target() {
                    tracing::info!(
                        captured = self.captured_count(),
                        "start requested with full budget; staying idle"
                    );
                    return Ok(());
                }
                self.phase = Phase::Running;
                tracing::info!(
                    captured = self.captured_count(),
                    pose = %self.current_pose(),
                    "capture session started"
                );
                Ok(())
            }
            from => Err(SessionError::InvalidTransition {
                from,
                action: "start",
            }),
        }
    }

    /// `Running → Idle`. Returns whether the phase changed.
    pub fn pause(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.phase = Phase::Idle;
        self.epoch += 1;
        tracing::info!(captured = self.captured_count(), "capture session paused");
        true
    }

    /// Zero every counter and drop all images. Always succeeds.
    pub fn retake(&mut self) {
        let discarded = self.images.len();
        self.images.clear();
        self.per_pose = [0; Pose::COUNT];
        self.phase = Phase::Idle;
        self.epoch += 1;
        tracing::info!(discarded, "capture session reset for retake");
    }

    /// Move to `Cancelled` from any phase, discarding all images.
    ///
    /// Returns the number of images discarded.
    pub fn cancel(&mut self) -> usize {
        let discarded = self.images.len();
        self.images.clear();
        self.per_pose = [0; Pose::COUNT];
        self.phase = Phase::Cancelled;
        self.epoch += 1;
        tracing::info!(discarded, "capture session cancelled");
        discarded
    }

    /// `Idle/Running → Completed`, refused below the minimum.
    pub fn complete(&mut self) -> Result<(), SessionError> {
        if self.phase.is_terminal() {
            return Err(SessionError::InvalidTransition {
                from: self.phase,
                action: "complete",
            });
        }
        let captured = self.captured_count();
        let minimum = self.policy.minimum_acceptable();
        if captured < minimum {
            let shortfall = minimum - captured;
            tracing::info!(captured, minimum, shortfall, "completion refused");
            return Err(SessionError::InsufficientImages {
                shortfall,
                captured,
                minimum,
            });
        }
        self.phase = Phase::Completed;
        self.epoch += 1;
        tracing::info!(captured, "capture session completed");
        Ok(())
    }

    /// Apply a frame returned by the capture device.
    ///
    /// `epoch` is the value of [`epoch`](Self::epoch) when the attempt was
    /// issued; a mismatch means pause, retake, cancel or complete happened
    /// in the meantime and the frame is discarded.
    pub fn accept_capture(&mut self, epoch: u64, reference: FrameHandle) -> CaptureOutcome {
        if epoch != self.epoch || !self.wants_capture() {
            tracing::debug!(
                attempt_epoch = epoch,
                epoch = self.epoch,
                phase = %self.phase,
                "discarding capture result"
            );
            return CaptureOutcome::Discarded;
        }

        let sequence_index = self.captured_count();
        let pose_index = self.sequencer.pose_index(sequence_index);
        let image = CapturedImage {
            reference,
            captured_at_pose_index: pose_index,
            sequence_index,
        };
        self.images.push(image.clone());
        self.per_pose[pose_index] += 1;
        debug_assert_eq!(self.per_pose.iter().sum::<usize>(), self.images.len());

        let auto_stopped = self.at_target();
        if auto_stopped {
            self.phase = Phase::Idle;
            tracing::info!(
                captured = self.captured_count(),
                "capture target reached; stopping"
            );
        } else {
            tracing::debug!(
                captured = self.captured_count(),
                pose = %Pose::ALL[pose_index],
                "capture accepted"
            );
        }

        CaptureOutcome::Accepted {
            image,
            auto_stopped,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let count = self.captured_count();
        SessionSnapshot {
            phase: self.phase,
            captured_count: count,
            total_target: self.policy.total_target(),
            minimum_acceptable: self.policy.minimum_acceptable(),
            current_pose: self.sequencer.pose_at(count),
            progress_within_pose: self.sequencer.progress_within_pose(count),
            images_per_pose: self.sequencer.images_per_pose(),
            per_pose_counts: Pose::ALL
                .iter()
                .map(|&pose| PoseProgress {
                    pose,
                    count: self.per_pose[pose.index()],
                    quota: self.sequencer.quota(pose),
                })
                .collect(),
        }
    }
}
