//! Alignment check: turns a located face box into a detection sample.
//!
//! The face must sit inside a circular target region (the on-screen guide)
//! and fill a plausible share of the frame. Coordinates are normalized to
//! the frame, so the check is independent of camera resolution.

use crate::types::{BoundingBox, DetectionSample};
use serde::{Deserialize, Serialize};

const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_CENTER_TOLERANCE: f32 = 0.12;
const DEFAULT_MIN_FACE_RATIO: f32 = 0.25;
const DEFAULT_MAX_FACE_RATIO: f32 = 0.75;

/// Target region the face has to be aligned with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetRegion {
    pub center_x: f32,
    pub center_y: f32,
    /// Maximum distance between face centre and region centre.
    pub center_tolerance: f32,
    /// Allowed face height as a fraction of the frame height.
    pub min_face_ratio: f32,
    pub max_face_ratio: f32,
}

impl Default for TargetRegion {
    fn default() -> Self {
        Self {
            center_x: 0.5,
            center_y: 0.5,
            center_tolerance: DEFAULT_CENTER_TOLERANCE,
            min_face_ratio: DEFAULT_MIN_FACE_RATIO,
            max_face_ratio: DEFAULT_MAX_FACE_RATIO,
        }
    }
}

/// Converts face boxes into `DetectionSample`s against a target region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentCheck {
    pub region: TargetRegion,
    pub min_confidence: f32,
}

impl Default for AlignmentCheck {
    fn default() -> Self {
        Self {
            region: TargetRegion::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl AlignmentCheck {
    /// Evaluate the best face in `faces` (highest confidence).
    pub fn evaluate(&self, faces: &[BoundingBox]) -> DetectionSample {
        let best = faces
            .iter()
            .filter(|f| f.confidence >= self.min_confidence)
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        match best {
            None => DetectionSample::NOT_DETECTED,
            Some(face) => DetectionSample::new(true, self.is_aligned(face)),
        }
    }

    /// Whether a single face sits inside the target region at an acceptable size.
    pub fn is_aligned(&self, face: &BoundingBox) -> bool {
        let region = &self.region;
        let (cx, cy) = face.center();
        let dx = cx - region.center_x;
        let dy = cy - region.center_y;
        let offset = (dx * dx + dy * dy).sqrt();

        offset <= region.center_tolerance
            && face.height >= region.min_face_ratio
            && face.height <= region.max_face_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(cx: f32, cy: f32, size: f32, confidence: f32) -> BoundingBox {
        BoundingBox {
            x: cx - size / 2.0,
            y: cy - size / 2.0,
            width: size,
            height: size,
            confidence,
        }
    }

    #[test]
    fn test_no_faces_is_not_detected() {
        let sample = AlignmentCheck::default().evaluate(&[]);
        assert_eq!(sample, DetectionSample::NOT_DETECTED);
    }

    #[test]
    fn test_low_confidence_face_is_ignored() {
        let sample = AlignmentCheck::default().evaluate(&[face(0.5, 0.5, 0.5, 0.2)]);
        assert!(!sample.face_detected);
    }

    #[test]
    fn test_centered_face_is_aligned() {
        let sample = AlignmentCheck::default().evaluate(&[face(0.5, 0.5, 0.5, 0.9)]);
        assert!(sample.is_capture_eligible());
    }

    #[test]
    fn test_off_center_face_is_detected_but_not_aligned() {
        let sample = AlignmentCheck::default().evaluate(&[face(0.8, 0.5, 0.5, 0.9)]);
        assert!(sample.face_detected);
        assert!(!sample.is_aligned);
    }

    #[test]
    fn test_face_too_small_or_too_large() {
        let check = AlignmentCheck::default();
        assert!(!check.is_aligned(&face(0.5, 0.5, 0.1, 0.9)));
        assert!(!check.is_aligned(&face(0.5, 0.5, 0.9, 0.9)));
    }

    #[test]
    fn test_best_face_wins() {
        let faces = [face(0.9, 0.9, 0.5, 0.6), face(0.5, 0.5, 0.5, 0.95)];
        assert!(AlignmentCheck::default().evaluate(&faces).is_capture_eligible());
    }
}
