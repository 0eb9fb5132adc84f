//! Detection-and-alignment gate.
//!
//! Answers one question per capture tick: is the subject eligible for a
//! capture right now? Every sample is tagged with the detection tick that
//! produced it and the session epoch it was taken under, and can drive at
//! most one capture decision.

use crate::types::DetectionSample;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A detection sample stamped with the tick and session epoch that produced it.
///
/// Tick `0` is reserved for "no sample yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaggedSample {
    pub tick: u64,
    pub epoch: u64,
    pub sample: DetectionSample,
}

impl TaggedSample {
    pub fn new(tick: u64, epoch: u64, sample: DetectionSample) -> Self {
        Self {
            tick,
            epoch,
            sample,
        }
    }

    /// The sample, unless nothing has been sampled yet.
    pub fn latest(&self) -> Option<DetectionSample> {
        (self.tick > 0).then_some(self.sample)
    }
}

/// Collapse a detector result into a sample.
///
/// An unavailable detector degrades to "no face" for this tick; the error is
/// logged and never propagated.
pub fn degrade<E: Display>(result: Result<DetectionSample, E>) -> DetectionSample {
    match result {
        Ok(sample) => sample,
        Err(e) => {
            tracing::debug!(error = %e, "detector unavailable; treating tick as no face");
            DetectionSample::NOT_DETECTED
        }
    }
}

/// Tracks which detection tick was last used for a capture decision.
#[derive(Debug, Clone, Default)]
pub struct DetectionGate {
    consumed_tick: u64,
}

impl DetectionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide eligibility from the freshest sample and mark it consumed.
    ///
    /// A sample is stale, and never eligible, when its tick was already
    /// consumed or when it was taken under a different session epoch.
    pub fn take(&mut self, latest: TaggedSample, epoch: u64) -> bool {
        if latest.tick <= self.consumed_tick {
            return false;
        }
        self.consumed_tick = latest.tick;
        latest.epoch == epoch && latest.sample.is_capture_eligible()
    }

    pub fn consumed_tick(&self) -> u64 {
        self.consumed_tick
    }
}
