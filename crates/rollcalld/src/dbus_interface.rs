use crate::engine::{EngineError, EngineHandle};
use serde::Serialize;
use zbus::interface;

/// D-Bus interface for the enrollment capture controller.
///
/// Bus name: org.rollcall.Enrollment1
/// Object path: /org/rollcall/Enrollment1
///
/// Structured replies are JSON strings, matching what `rollcall` prints.
pub struct EnrollmentService {
    pub engine: EngineHandle,
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn to_fdo(e: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.rollcall.Enrollment1")]
impl EnrollmentService {
    /// Begin or resume capturing. Returns the session snapshot.
    async fn start(&self) -> zbus::fdo::Result<String> {
        tracing::info!("start requested");
        let snapshot = self.engine.start().await.map_err(to_fdo)?;
        to_json(&snapshot)
    }

    /// Stop capturing but keep the images taken so far.
    async fn pause(&self) -> zbus::fdo::Result<String> {
        tracing::info!("pause requested");
        let snapshot = self.engine.pause().await.map_err(to_fdo)?;
        to_json(&snapshot)
    }

    /// Throw away every image and return to the first pose.
    async fn retake(&self) -> zbus::fdo::Result<String> {
        tracing::info!("retake requested");
        let snapshot = self.engine.retake().await.map_err(to_fdo)?;
        to_json(&snapshot)
    }

    /// Abandon the session. Returns the number of images discarded.
    async fn cancel(&self) -> zbus::fdo::Result<u32> {
        tracing::info!("cancel requested");
        let discarded = self.engine.cancel().await.map_err(to_fdo)?;
        Ok(u32::try_from(discarded).unwrap_or(u32::MAX))
    }

    /// Finish the session and submit its images for `subject_id`.
    async fn complete(&self, subject_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(subject = subject_id, "complete requested");
        let receipt = self.engine.complete(subject_id).await.map_err(to_fdo)?;
        to_json(&receipt)
    }

    /// Retry the submission of a completed session.
    async fn resubmit(&self, subject_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(subject = subject_id, "resubmit requested");
        let receipt = self.engine.resubmit(subject_id).await.map_err(to_fdo)?;
        to_json(&receipt)
    }

    /// Current session snapshot.
    async fn state(&self) -> zbus::fdo::Result<String> {
        to_json(&self.engine.state())
    }

    /// Text to show next to the camera preview.
    async fn guidance(&self) -> zbus::fdo::Result<String> {
        to_json(&self.engine.guidance())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.engine.state();
        let latest = self.engine.latest_sample();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "phase": snapshot.phase,
            "captured": snapshot.captured_count,
            "total_target": snapshot.total_target,
            "minimum_acceptable": snapshot.minimum_acceptable,
            "face_detected": latest.map(|s| s.face_detected),
            "aligned": latest.map(|s| s.is_aligned),
        })
        .to_string())
    }
}
