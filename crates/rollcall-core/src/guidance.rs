//! User-facing guidance derived from a session snapshot.

use crate::session::SessionSnapshot;
use crate::types::{DetectionSample, Phase, Pose};
use serde::{Deserialize, Serialize};

/// Text and progress shown next to the camera preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guidance {
    pub headline: String,
    pub detail: String,
    /// Overall progress, 0–100.
    pub percent: u8,
}

pub fn pose_instruction(pose: Pose) -> &'static str {
    match pose {
        Pose::Front => "Look straight at the camera",
        Pose::Left => "Turn your head slightly to the left",
        Pose::Right => "Turn your head slightly to the right",
        Pose::Up => "Tilt your head slightly up",
        Pose::Down => "Tilt your head slightly down",
    }
}

/// Project a snapshot (and the latest detector reading, if any) into guidance.
pub fn guidance(snapshot: &SessionSnapshot, latest: Option<DetectionSample>) -> Guidance {
    let percent = if snapshot.total_target == 0 {
        0
    } else {
        ((snapshot.captured_count.min(snapshot.total_target) * 100) / snapshot.total_target) as u8
    };

    let (headline, detail) = match snapshot.phase {
        Phase::Cancelled => (
            "Enrollment cancelled".to_string(),
            "No images were kept".to_string(),
        ),
        Phase::Completed => (
            "Enrollment complete".to_string(),
            format!("{} images captured", snapshot.captured_count),
        ),
        Phase::Idle if snapshot.captured_count >= snapshot.total_target => (
            "All images captured".to_string(),
            "Submit to finish enrollment".to_string(),
        ),
        Phase::Idle if snapshot.captured_count == 0 => (
            "Ready to start".to_string(),
            "Press start and follow the instructions".to_string(),
        ),
        Phase::Idle => {
            let detail = if snapshot.can_complete() {
                "Resume to capture more, or submit now".to_string()
            } else {
                format!("{} more images needed", snapshot.shortfall())
            };
            ("Paused".to_string(), detail)
        }
        Phase::Running => {
            let headline = pose_instruction(snapshot.current_pose).to_string();
            let detail = match latest {
                Some(s) if !s.face_detected => "No face detected".to_string(),
                Some(s) if !s.is_aligned => "Centre your face inside the guide".to_string(),
                _ => {
                    let quota = snapshot
                        .per_pose_counts
                        .get(snapshot.current_pose.index())
                        .map_or(snapshot.images_per_pose, |p| p.quota);
                    format!(
                        "Hold still ({} of {} for this pose)",
                        snapshot.progress_within_pose, quota
                    )
                }
            };
            (headline, detail)
        }
    };

    Guidance {
        headline,
        detail,
        percent,
    }
}
