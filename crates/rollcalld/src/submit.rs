//! Submission of completed sessions.

use chrono::{DateTime, Utc};
use rollcall_core::{CapturedImage, Pose};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("invalid subject id: {0:?}")]
    InvalidSubject(String),
    #[error("nothing to submit")]
    Empty,
    #[error("failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode manifest: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Proof that a session's images were handed off.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub subject_id: String,
    pub image_count: usize,
    pub submitted_at: DateTime<Utc>,
    pub location: String,
}

/// Receives the ordered images of a completed session.
pub trait Submitter: Send + 'static {
    fn submit(
        &mut self,
        images: &[CapturedImage],
        subject_id: &str,
    ) -> impl Future<Output = Result<SubmissionReceipt, SubmissionError>> + Send;
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    sequence_index: usize,
    pose: Pose,
    reference: &'a str,
}

#[derive(Serialize)]
struct Manifest<'a> {
    subject_id: &'a str,
    submitted_at: DateTime<Utc>,
    image_count: usize,
    images: Vec<ManifestEntry<'a>>,
}

/// Writes one JSON manifest per submission into a spool directory for an
/// uploader to pick up.
pub struct SpoolSubmitter {
    dir: PathBuf,
}

impl SpoolSubmitter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Submitter for SpoolSubmitter {
    async fn submit(
        &mut self,
        images: &[CapturedImage],
        subject_id: &str,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        validate_subject(subject_id)?;
        if images.is_empty() {
            return Err(SubmissionError::Empty);
        }

        let submitted_at = Utc::now();
        let manifest = Manifest {
            subject_id,
            submitted_at,
            image_count: images.len(),
            images: images
                .iter()
                .map(|image| ManifestEntry {
                    sequence_index: image.sequence_index,
                    pose: image.pose(),
                    reference: image.reference.as_str(),
                })
                .collect(),
        };
        let body = serde_json::to_vec_pretty(&manifest)?;

        let path = self.dir.join(format!(
            "{subject_id}-{}.json",
            submitted_at.format("%Y%m%dT%H%M%S%.3fZ")
        ));
        let write_err = |source| SubmissionError::Write {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(write_err)?;
        tokio::fs::write(&path, body).await.map_err(write_err)?;

        tracing::info!(
            subject = subject_id,
            images = images.len(),
            path = %path.display(),
            "enrollment manifest spooled"
        );

        Ok(SubmissionReceipt {
            subject_id: subject_id.to_string(),
            image_count: images.len(),
            submitted_at,
            location: path.to_string_lossy().into_owned(),
        })
    }
}

/// Subject ids become file names, so only `[A-Za-z0-9_-]` is accepted.
fn validate_subject(subject_id: &str) -> Result<(), SubmissionError> {
    let valid = !subject_id.is_empty()
        && subject_id.len() <= 64
        && subject_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SubmissionError::InvalidSubject(subject_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::FrameHandle;

    fn images(n: usize) -> Vec<CapturedImage> {
        (0..n)
            .map(|i| CapturedImage {
                reference: FrameHandle::new(format!("frame-{i}")),
                captured_at_pose_index: i / 2,
                sequence_index: i,
            })
            .collect()
    }

    fn temp_spool(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rollcall-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn test_subject_validation() {
        assert!(validate_subject("rider-042").is_ok());
        assert!(validate_subject("a_b").is_ok());
        assert!(validate_subject("").is_err());
        assert!(validate_subject("../etc/passwd").is_err());
        assert!(validate_subject("has space").is_err());
    }

    #[tokio::test]
    async fn test_spool_writes_ordered_manifest() {
        let dir = temp_spool("manifest");
        let mut submitter = SpoolSubmitter::new(&dir);

        let receipt = submitter.submit(&images(4), "rider-7").await.unwrap();
        assert_eq!(receipt.image_count, 4);
        assert_eq!(receipt.subject_id, "rider-7");

        let body = std::fs::read_to_string(&receipt.location).unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["subject_id"], "rider-7");
        assert_eq!(json["image_count"], 4);
        assert_eq!(json["images"][0]["pose"], "front");
        assert_eq!(json["images"][2]["pose"], "left");
        assert_eq!(json["images"][3]["sequence_index"], 3);
        assert_eq!(json["images"][3]["reference"], "frame-3");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_spool_rejects_empty_submission() {
        let mut submitter = SpoolSubmitter::new(temp_spool("empty"));
        assert!(matches!(
            submitter.submit(&[], "rider-1").await,
            Err(SubmissionError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_spool_rejects_bad_subject() {
        let mut submitter = SpoolSubmitter::new(temp_spool("subject"));
        assert!(matches!(
            submitter.submit(&images(1), "a/b").await,
            Err(SubmissionError::InvalidSubject(_))
        ));
    }
}
