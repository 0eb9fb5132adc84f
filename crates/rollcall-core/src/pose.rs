//! Pose sequencing. Maps a running capture count to the required head pose.
//!
//! The sequencer is a pure function of the count: the same count always
//! yields the same pose and progress, so a session can be replayed or
//! resumed from its captured image sequence alone.

use crate::types::Pose;

/// Splits a fixed capture budget across the ordered pose list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseSequencer {
    total_target: usize,
    images_per_pose: usize,
}

impl PoseSequencer {
    /// Build a sequencer for `total_target` images.
    ///
    /// A zero target is treated as one image so the modulus below is never zero.
    pub fn new(total_target: usize) -> Self {
        let total_target = total_target.max(1);
        Self {
            total_target,
            images_per_pose: total_target.div_ceil(Pose::COUNT),
        }
    }

    pub fn total_target(&self) -> usize {
        self.total_target
    }

    /// `ceil(total_target / number_of_poses)`.
    pub fn images_per_pose(&self) -> usize {
        self.images_per_pose
    }

    /// Index of the active pose, clamped to the last pose once the budget is spent.
    pub fn pose_index(&self, captured_count: usize) -> usize {
        (captured_count / self.images_per_pose).min(Pose::COUNT - 1)
    }

    pub fn pose_at(&self, captured_count: usize) -> Pose {
        Pose::ALL[self.pose_index(captured_count)]
    }

    /// Progress inside the active pose, against the same modulus for every pose.
    pub fn progress_within_pose(&self, captured_count: usize) -> usize {
        captured_count % self.images_per_pose
    }

    /// Images required for `pose`.
    ///
    /// Every pose gets `images_per_pose` except where the remaining budget is
    /// smaller; the last pose absorbs the remainder and may be short.
    pub fn quota(&self, pose: Pose) -> usize {
        let consumed = self.images_per_pose * pose.index();
        let remaining = self.total_target.saturating_sub(consumed);
        if pose.index() == Pose::COUNT - 1 {
            remaining
        } else {
            remaining.min(self.images_per_pose)
        }
    }
}
