//! Detector capability contract and a simulated backend.
//!
//! A detector reports, once per tick, whether a face is present and whether
//! it is aligned with the target region. The simulated backend generates
//! jittered face boxes and runs them through the same [`AlignmentCheck`]
//! a real locator would use.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rollcall_core::{AlignmentCheck, BoundingBox, DetectionSample};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),
}

/// Per-tick face presence and alignment.
pub trait Detector: Send + 'static {
    fn sample(&mut self) -> impl Future<Output = Result<DetectionSample, DetectorError>> + Send;
}

/// Tuning for [`SimulatedDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationProfile {
    /// Probability that a face is in view on a given tick.
    pub face_probability: f64,
    /// Maximum offset of the face centre from the region centre, per axis.
    pub jitter: f32,
    /// Probability that the detector is unavailable on a given tick.
    pub outage_rate: f64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            face_probability: 0.9,
            jitter: 0.15,
            outage_rate: 0.0,
        }
    }
}

pub struct SimulatedDetector {
    profile: SimulationProfile,
    check: AlignmentCheck,
    rng: StdRng,
}

impl SimulatedDetector {
    /// Rates outside `[0, 1]` are clamped; non-finite rates and jitter become `0`.
    pub fn new(profile: SimulationProfile, check: AlignmentCheck) -> Self {
        let jitter = if profile.jitter.is_finite() {
            profile.jitter.abs()
        } else {
            0.0
        };
        let profile = SimulationProfile {
            face_probability: crate::probability(profile.face_probability),
            jitter,
            outage_rate: crate::probability(profile.outage_rate),
        };
        Self {
            profile,
            check,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Generate the faces visible on this tick.
    fn locate(&mut self) -> Vec<BoundingBox> {
        if !self.rng.gen_bool(self.profile.face_probability) {
            return Vec::new();
        }

        let jitter = self.profile.jitter;
        let region = self.check.region;
        let (dx, dy) = if jitter > 0.0 {
            (
                self.rng.gen_range(-jitter..=jitter),
                self.rng.gen_range(-jitter..=jitter),
            )
        } else {
            (0.0, 0.0)
        };
        let size = self.rng.gen_range(0.3f32..=0.6);
        let confidence = self.rng.gen_range(0.6f32..=0.99);

        vec![BoundingBox {
            x: region.center_x + dx - size / 2.0,
            y: region.center_y + dy - size / 2.0,
            width: size,
            height: size,
            confidence,
        }]
    }
}

impl Detector for SimulatedDetector {
    async fn sample(&mut self) -> Result<DetectionSample, DetectorError> {
        if self.rng.gen_bool(self.profile.outage_rate) {
            return Err(DetectorError::Unavailable("simulated outage".into()));
        }
        let faces = self.locate();
        Ok(self.check.evaluate(&faces))
    }
}
