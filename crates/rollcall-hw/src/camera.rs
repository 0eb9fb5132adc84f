//! Capture device contract and a simulated camera backend.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rollcall_core::FrameHandle;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// A device that can take one still frame at a time.
///
/// Implementations are single-owner and non-reentrant: the caller never
/// issues a second capture while one is unresolved.
pub trait CaptureDevice: Send + 'static {
    fn capture_frame(&mut self) -> impl Future<Output = Result<FrameHandle, CameraError>> + Send;
}

/// Camera stand-in that mints frame handles after a fixed latency.
pub struct SimulatedCamera {
    latency: Duration,
    failure_rate: f64,
    rng: StdRng,
    frames_taken: u64,
}

impl SimulatedCamera {
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        Self {
            latency,
            failure_rate: crate::probability(failure_rate),
            rng: StdRng::from_entropy(),
            frames_taken: 0,
        }
    }

    /// Deterministic failure pattern for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Number of successful captures so far.
    pub fn frames_taken(&self) -> u64 {
        self.frames_taken
    }
}

impl CaptureDevice for SimulatedCamera {
    async fn capture_frame(&mut self) -> Result<FrameHandle, CameraError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.rng.gen_bool(self.failure_rate) {
            return Err(CameraError::CaptureFailed("simulated sensor timeout".into()));
        }

        self.frames_taken += 1;
        let handle = FrameHandle::new(format!("frame-{}", uuid::Uuid::new_v4()));
        tracing::trace!(frame = %handle, taken = self.frames_taken, "simulated frame captured");
        Ok(handle)
    }
}
