//! rollcall-hw — Device collaborators for the enrollment controller.
//!
//! Defines the capture device and detector capability contracts and ships
//! simulated backends for both, so the controller runs without a camera.

pub mod camera;
pub mod detector;

pub use camera::{CameraError, CaptureDevice, SimulatedCamera};
pub use detector::{Detector, DetectorError, SimulatedDetector, SimulationProfile};

/// Coerce a configured rate into a probability `gen_bool` accepts.
///
/// Non-finite rates become `0.0`; everything else is clamped to `[0, 1]`.
pub(crate) fn probability(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
