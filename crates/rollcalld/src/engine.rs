use crate::submit::{SubmissionError, SubmissionReceipt, Submitter};
use rollcall_core::gate::{self, DetectionGate, TaggedSample};
use rollcall_core::guidance::{self, Guidance};
use rollcall_core::{
    CaptureOutcome, CaptureSession, DetectionSample, FrameHandle, Phase, SessionError,
    SessionPolicy, SessionSnapshot,
};
use rollcall_hw::{CameraError, CaptureDevice, Detector};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("submission failed: {0}")]
    Submission(#[from] SubmissionError),
    #[error("engine task exited")]
    ChannelClosed,
}

/// Timing and policy for one engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub policy: SessionPolicy,
    pub capture_interval: Duration,
    pub detection_interval: Duration,
    pub detector_timeout: Duration,
}

/// Run state shared with the detection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunState {
    phase: Phase,
    epoch: u64,
}

/// Messages sent from D-Bus handlers to the engine task.
enum EngineRequest {
    Start {
        reply: oneshot::Sender<Result<SessionSnapshot, EngineError>>,
    },
    Pause {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Retake {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Cancel {
        reply: oneshot::Sender<usize>,
    },
    Complete {
        subject_id: String,
        reply: oneshot::Sender<Result<SubmissionReceipt, EngineError>>,
    },
    Resubmit {
        subject_id: String,
        reply: oneshot::Sender<Result<SubmissionReceipt, EngineError>>,
    },
}

type CaptureResult = Result<FrameHandle, CameraError>;

struct CaptureRequest {
    reply: oneshot::Sender<CaptureResult>,
}

/// The single capture allowed in flight, with the epoch it was issued under.
struct PendingCapture {
    epoch: u64,
    rx: oneshot::Receiver<CaptureResult>,
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    state: watch::Receiver<SessionSnapshot>,
    samples: watch::Receiver<TaggedSample>,
}

impl EngineHandle {
    /// Begin (or resume) capturing.
    pub async fn start(&self) -> Result<SessionSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Start { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn pause(&self) -> Result<SessionSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Pause { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn retake(&self) -> Result<SessionSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Retake { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Cancel the session. Returns the number of images discarded.
    pub async fn cancel(&self) -> Result<usize, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Cancel { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Complete the session and hand its images to the submitter.
    pub async fn complete(&self, subject_id: &str) -> Result<SubmissionReceipt, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Complete {
            subject_id: subject_id.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Retry the handoff of a session left completed by a failed submission.
    pub async fn resubmit(&self, subject_id: &str) -> Result<SubmissionReceipt, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Resubmit {
            subject_id: subject_id.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Latest published snapshot. Never blocks on the engine task.
    pub fn state(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Most recent detector reading, if the detector has run.
    pub fn latest_sample(&self) -> Option<DetectionSample> {
        self.samples.borrow().latest()
    }

    pub fn guidance(&self) -> Guidance {
        let snapshot = self.state();
        let latest = if snapshot.phase.is_running() {
            self.latest_sample()
        } else {
            None
        };
        guidance::guidance(&snapshot, latest)
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine: a detection loop, a capture worker and the session task.
///
/// Must be called from within a tokio runtime. Each collaborator is moved
/// into the task that owns it, so neither device can be called concurrently.
pub fn spawn_engine<D, C, S>(
    settings: EngineSettings,
    detector: D,
    camera: C,
    submitter: S,
) -> EngineHandle
where
    D: Detector,
    C: CaptureDevice,
    S: Submitter,
{
    let session = CaptureSession::new(settings.policy);
    let (state_tx, state_rx) = watch::channel(session.snapshot());
    let (run_tx, run_rx) = watch::channel(RunState {
        phase: session.phase(),
        epoch: session.epoch(),
    });
    let (sample_tx, sample_rx) = watch::channel(TaggedSample::default());
    let (tx, rx) = mpsc::channel::<EngineRequest>(8);

    tokio::spawn(run_detection(
        detector,
        settings.detection_interval,
        settings.detector_timeout,
        run_rx,
        sample_tx,
    ));
    let capture_tx = spawn_capture_worker(camera);

    let engine = Engine {
        session,
        gate: DetectionGate::new(),
        submitter,
        rx,
        capture_tx,
        pending: None,
        samples: sample_rx.clone(),
        state_tx,
        run_tx,
    };
    tokio::spawn(engine.run(settings.capture_interval));

    tracing::info!(
        total_target = settings.policy.total_target(),
        minimum = settings.policy.minimum_acceptable(),
        capture_ms = settings.capture_interval.as_millis() as u64,
        detection_ms = settings.detection_interval.as_millis() as u64,
        "enrollment engine started"
    );

    EngineHandle {
        tx,
        state: state_rx,
        samples: sample_rx,
    }
}

/// Sample the detector on every tick while the session is running.
///
/// Exits once the engine task drops its side of the run-state channel.
async fn run_detection<D: Detector>(
    mut detector: D,
    interval: Duration,
    timeout: Duration,
    run_state: watch::Receiver<RunState>,
    samples: watch::Sender<TaggedSample>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick = 0u64;

    loop {
        ticker.tick().await;
        if run_state.has_changed().is_err() {
            break;
        }
        let state = *run_state.borrow();
        if !state.phase.is_running() {
            continue;
        }

        let sample = match tokio::time::timeout(timeout, detector.sample()).await {
            Ok(result) => gate::degrade(result),
            Err(_) => {
                tracing::debug!(timeout_ms = timeout.as_millis() as u64, "detector timed out");
                DetectionSample::NOT_DETECTED
            }
        };
        tick += 1;
        samples.send_replace(TaggedSample::new(tick, state.epoch, sample));
    }
    tracing::debug!("detection loop exiting");
}

/// Serve capture requests one at a time on a task that owns the device.
fn spawn_capture_worker<C: CaptureDevice>(mut camera: C) -> mpsc::Sender<CaptureRequest> {
    let (tx, mut rx) = mpsc::channel::<CaptureRequest>(1);
    tokio::spawn(async move {
        while let Some(req) = rx.recv().await {
            let result = camera.capture_frame().await;
            let _ = req.reply.send(result);
        }
        tracing::debug!("capture worker exiting");
    });
    tx
}

/// Single owner of the capture session.
struct Engine<S> {
    session: CaptureSession,
    gate: DetectionGate,
    submitter: S,
    rx: mpsc::Receiver<EngineRequest>,
    capture_tx: mpsc::Sender<CaptureRequest>,
    pending: Option<PendingCapture>,
    samples: watch::Receiver<TaggedSample>,
    state_tx: watch::Sender<SessionSnapshot>,
    run_tx: watch::Sender<RunState>,
}

impl<S: Submitter> Engine<S> {
    async fn run(mut self, capture_interval: Duration) {
        let mut ticker = tokio::time::interval(capture_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                req = self.rx.recv() => match req {
                    Some(req) => self.handle(req).await,
                    None => break,
                },
                result = wait_pending(&mut self.pending) => self.on_capture_result(result),
                _ = ticker.tick() => self.on_capture_tick(),
            }
            self.publish();
        }
        tracing::info!("engine task exiting");
    }

    /// Apply one request. Watchers see the new state before the caller
    /// gets its reply.
    async fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::Start { reply } => {
                let result = self
                    .session
                    .start()
                    .map(|()| self.session.snapshot())
                    .map_err(EngineError::from);
                self.publish();
                let _ = reply.send(result);
            }
            EngineRequest::Pause { reply } => {
                self.session.pause();
                self.publish();
                let _ = reply.send(self.session.snapshot());
            }
            EngineRequest::Retake { reply } => {
                self.session.retake();
                self.publish();
                let _ = reply.send(self.session.snapshot());
            }
            EngineRequest::Cancel { reply } => {
                let discarded = self.session.cancel();
                self.publish();
                let _ = reply.send(discarded);
            }
            EngineRequest::Complete { subject_id, reply } => {
                let result = match self.session.complete() {
                    Ok(()) => self.submit(&subject_id).await,
                    Err(e) => Err(e.into()),
                };
                self.publish();
                let _ = reply.send(result);
            }
            EngineRequest::Resubmit { subject_id, reply } => {
                let result = if self.session.phase() == Phase::Completed {
                    self.submit(&subject_id).await
                } else {
                    Err(SessionError::InvalidTransition {
                        from: self.session.phase(),
                        action: "resubmit",
                    }
                    .into())
                };
                self.publish();
                let _ = reply.send(result);
            }
        }
    }

    /// Hand the completed session to the submitter.
    ///
    /// On success the session is discarded and a fresh one takes its place;
    /// on failure it stays completed so the caller can resubmit.
    async fn submit(&mut self, subject_id: &str) -> Result<SubmissionReceipt, EngineError> {
        match self
            .submitter
            .submit(self.session.captured_images(), subject_id)
            .await
        {
            Ok(receipt) => {
                tracing::info!(
                    subject = subject_id,
                    images = receipt.image_count,
                    "enrollment submitted"
                );
                self.session = self.session.renew();
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(subject = subject_id, error = %e, "submission failed; session kept for resubmit");
                Err(e.into())
            }
        }
    }

    /// One capture-cadence tick: issue a device call if the gate allows it.
    fn on_capture_tick(&mut self) {
        if !self.session.wants_capture() || self.pending.is_some() {
            return;
        }

        let latest = *self.samples.borrow();
        let epoch = self.session.epoch();
        if !self.gate.take(latest, epoch) {
            return;
        }

        let (reply, rx) = oneshot::channel();
        match self.capture_tx.try_send(CaptureRequest { reply }) {
            Ok(()) => self.pending = Some(PendingCapture { epoch, rx }),
            Err(e) => tracing::warn!(error = %e, "capture worker unavailable"),
        }
    }

    fn on_capture_result(&mut self, (epoch, result): (u64, Option<CaptureResult>)) {
        match result {
            Some(Ok(frame)) => {
                if let CaptureOutcome::Accepted { auto_stopped, .. } =
                    self.session.accept_capture(epoch, frame)
                {
                    if auto_stopped {
                        tracing::info!("all images captured");
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "capture attempt failed; retrying next tick");
            }
            None => tracing::error!("capture worker dropped a request"),
        }
    }

    fn publish(&self) {
        self.run_tx.send_if_modified(|state| {
            let next = RunState {
                phase: self.session.phase(),
                epoch: self.session.epoch(),
            };
            let changed = *state != next;
            *state = next;
            changed
        });
        self.state_tx.send_if_modified(|snapshot| {
            let next = self.session.snapshot();
            let changed = *snapshot != next;
            *snapshot = next;
            changed
        });
    }
}

/// Resolve the in-flight capture, or never if there is none.
async fn wait_pending(pending: &mut Option<PendingCapture>) -> (u64, Option<CaptureResult>) {
    match pending {
        Some(p) => {
            let result = (&mut p.rx).await.ok();
            let epoch = p.epoch;
            *pending = None;
            (epoch, result)
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{CapturedImage, Pose};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Detector that replays a fixed reading on every tick.
    struct FixedDetector {
        sample: Result<DetectionSample, rollcall_hw::DetectorError>,
        calls: Arc<AtomicUsize>,
        latency: Duration,
    }

    impl Detector for FixedDetector {
        async fn sample(&mut self) -> Result<DetectionSample, rollcall_hw::DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.sample.clone()
        }
    }

    /// Camera that counts calls and fails when told to.
    struct CountingCamera {
        calls: Arc<AtomicUsize>,
        fail: bool,
        latency: Duration,
    }

    impl CaptureDevice for CountingCamera {
        async fn capture_frame(&mut self) -> Result<FrameHandle, CameraError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.fail {
                Err(CameraError::CaptureFailed("lens cap".into()))
            } else {
                Ok(FrameHandle::new(format!("frame-{n}")))
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSubmitter {
        submitted: Arc<Mutex<Vec<(String, Vec<CapturedImage>)>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl Submitter for RecordingSubmitter {
        async fn submit(
            &mut self,
            images: &[CapturedImage],
            subject_id: &str,
        ) -> Result<SubmissionReceipt, SubmissionError> {
            if *self.fail.lock().unwrap() {
                return Err(SubmissionError::Empty);
            }
            self.submitted
                .lock()
                .unwrap()
                .push((subject_id.to_string(), images.to_vec()));
            Ok(SubmissionReceipt {
                subject_id: subject_id.to_string(),
                image_count: images.len(),
                submitted_at: chrono::Utc::now(),
                location: "memory".into(),
            })
        }
    }

    struct Rig {
        engine: EngineHandle,
        detector_calls: Arc<AtomicUsize>,
        camera_calls: Arc<AtomicUsize>,
        submitter: RecordingSubmitter,
    }

    fn rig(
        total: usize,
        minimum: usize,
        sample: Result<DetectionSample, rollcall_hw::DetectorError>,
        camera_fails: bool,
        camera_latency: Duration,
    ) -> Rig {
        let detector_calls = Arc::new(AtomicUsize::new(0));
        let camera_calls = Arc::new(AtomicUsize::new(0));
        let submitter = RecordingSubmitter::default();
        let settings = EngineSettings {
            policy: SessionPolicy::new(total, minimum).unwrap(),
            capture_interval: Duration::from_millis(100),
            detection_interval: Duration::from_millis(50),
            detector_timeout: Duration::from_millis(40),
        };
        let engine = spawn_engine(
            settings,
            FixedDetector {
                sample,
                calls: detector_calls.clone(),
                latency: Duration::ZERO,
            },
            CountingCamera {
                calls: camera_calls.clone(),
                fail: camera_fails,
                latency: camera_latency,
            },
            submitter.clone(),
        );
        Rig {
            engine,
            detector_calls,
            camera_calls,
            submitter,
        }
    }

    fn eligible() -> Result<DetectionSample, rollcall_hw::DetectorError> {
        Ok(DetectionSample::new(true, true))
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_captures_accumulate_while_running() {
        let rig = rig(10, 5, eligible(), false, Duration::ZERO);
        rig.engine.start().await.unwrap();
        advance(550).await;

        let state = rig.engine.state();
        assert_eq!(state.phase, Phase::Running);
        assert!(state.captured_count >= 3, "captured {}", state.captured_count);
        let tally: usize = state.per_pose_counts.iter().map(|p| p.count).sum();
        assert_eq!(tally, state.captured_count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_stop_at_target_stops_device_calls() {
        let rig = rig(5, 3, eligible(), false, Duration::ZERO);
        rig.engine.start().await.unwrap();
        advance(2_000).await;

        let state = rig.engine.state();
        assert_eq!(state.captured_count, 5);
        assert_eq!(state.phase, Phase::Idle);
        let calls = rig.camera_calls.load(Ordering::SeqCst);
        assert_eq!(calls, 5);

        advance(2_000).await;
        assert_eq!(rig.camera_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_eligible_detector_captures_nothing() {
        let rig = rig(10, 5, Ok(DetectionSample::NOT_DETECTED), false, Duration::ZERO);
        rig.engine.start().await.unwrap();
        advance(3_000).await;

        assert_eq!(rig.engine.state().captured_count, 0);
        assert_eq!(rig.camera_calls.load(Ordering::SeqCst), 0);
        assert!(rig.detector_calls.load(Ordering::SeqCst) > 0);
        assert_eq!(rig.engine.latest_sample(), Some(DetectionSample::NOT_DETECTED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detector_outage_degrades_silently() {
        let outage = Err(rollcall_hw::DetectorError::Unavailable("unplugged".into()));
        let rig = rig(10, 5, outage, false, Duration::ZERO);
        rig.engine.start().await.unwrap();
        advance(1_000).await;

        let state = rig.engine.state();
        assert_eq!(state.phase, Phase::Running);
        assert_eq!(state.captured_count, 0);
        assert_eq!(rig.camera_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_detector_counts_as_no_face() {
        let camera_calls = Arc::new(AtomicUsize::new(0));
        let settings = EngineSettings {
            policy: SessionPolicy::new(10, 5).unwrap(),
            capture_interval: Duration::from_millis(100),
            detection_interval: Duration::from_millis(50),
            detector_timeout: Duration::from_millis(40),
        };
        let engine = spawn_engine(
            settings,
            FixedDetector {
                sample: eligible(),
                calls: Arc::new(AtomicUsize::new(0)),
                latency: Duration::from_millis(45),
            },
            CountingCamera {
                calls: camera_calls.clone(),
                fail: false,
                latency: Duration::ZERO,
            },
            RecordingSubmitter::default(),
        );
        engine.start().await.unwrap();
        advance(1_000).await;

        assert_eq!(camera_calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.state().captured_count, 0);
        assert_eq!(engine.latest_sample(), Some(DetectionSample::NOT_DETECTED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_published_before_reply() {
        let rig = rig(3, 3, eligible(), false, Duration::ZERO);
        let started = rig.engine.start().await.unwrap();
        assert_eq!(started.phase, Phase::Running);
        assert_eq!(rig.engine.state().phase, Phase::Running);

        rig.engine.cancel().await.unwrap();
        assert_eq!(rig.engine.state().phase, Phase::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_camera_changes_no_counters() {
        let rig = rig(10, 5, eligible(), true, Duration::ZERO);
        rig.engine.start().await.unwrap();
        advance(1_000).await;

        assert!(rig.camera_calls.load(Ordering::SeqCst) > 0);
        let state = rig.engine.state();
        assert_eq!(state.captured_count, 0);
        assert_eq!(state.phase, Phase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_never_samples_or_captures() {
        let rig = rig(10, 5, eligible(), false, Duration::ZERO);
        advance(1_000).await;
        assert_eq!(rig.detector_calls.load(Ordering::SeqCst), 0);
        assert_eq!(rig.camera_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_captures_and_discards_in_flight() {
        // Captures take longer than a tick so one is always in flight.
        let rig = rig(50, 5, eligible(), false, Duration::from_millis(250));
        rig.engine.start().await.unwrap();
        advance(400).await;

        let paused = rig.engine.pause().await.unwrap();
        assert_eq!(paused.phase, Phase::Idle);

        // Let the in-flight attempt land; its result belongs to the old epoch.
        advance(500).await;
        let calls = rig.camera_calls.load(Ordering::SeqCst);
        advance(2_000).await;
        assert_eq!(rig.camera_calls.load(Ordering::SeqCst), calls);
        assert_eq!(rig.engine.state().captured_count, paused.captured_count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_capture_in_flight() {
        let rig = rig(50, 5, eligible(), false, Duration::from_millis(350));
        rig.engine.start().await.unwrap();
        advance(1_000).await;

        // With 350 ms captures and 100 ms ticks, at most three can have started.
        let calls = rig.camera_calls.load(Ordering::SeqCst);
        assert!(calls <= 3, "calls {calls}");
        assert!(rig.engine.state().captured_count <= calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_refused_below_minimum() {
        let rig = rig(10, 5, Ok(DetectionSample::NOT_DETECTED), false, Duration::ZERO);
        rig.engine.start().await.unwrap();
        let err = rig.engine.complete("rider-1").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Session(SessionError::InsufficientImages { shortfall: 5, .. })
        ));
        assert_eq!(rig.engine.state().phase, Phase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_submits_and_resets() {
        let rig = rig(4, 4, eligible(), false, Duration::ZERO);
        rig.engine.start().await.unwrap();
        advance(2_000).await;
        assert_eq!(rig.engine.state().captured_count, 4);

        let receipt = rig.engine.complete("rider-9").await.unwrap();
        assert_eq!(receipt.image_count, 4);

        let submitted = rig.submitter.submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 1);
        let (subject, images) = &submitted[0];
        assert_eq!(subject, "rider-9");
        let order: Vec<usize> = images.iter().map(|i| i.sequence_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(images[0].pose(), Pose::Front);

        let state = rig.engine.state();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.captured_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_submission_keeps_session_for_resubmit() {
        let rig = rig(3, 3, eligible(), false, Duration::ZERO);
        *rig.submitter.fail.lock().unwrap() = true;
        rig.engine.start().await.unwrap();
        advance(2_000).await;

        let err = rig.engine.complete("rider-2").await.unwrap_err();
        assert!(matches!(err, EngineError::Submission(_)));
        let state = rig.engine.state();
        assert_eq!(state.phase, Phase::Completed);
        assert_eq!(state.captured_count, 3);

        *rig.submitter.fail.lock().unwrap() = false;
        let receipt = rig.engine.resubmit("rider-2").await.unwrap();
        assert_eq!(receipt.image_count, 3);
        assert_eq!(rig.engine.state().captured_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmit_requires_completed_session() {
        let rig = rig(3, 3, eligible(), false, Duration::ZERO);
        assert!(matches!(
            rig.engine.resubmit("rider-2").await,
            Err(EngineError::Session(SessionError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_and_blocks_start() {
        let rig = rig(20, 5, eligible(), false, Duration::ZERO);
        rig.engine.start().await.unwrap();
        advance(500).await;
        let captured = rig.engine.state().captured_count;
        assert!(captured > 0);

        assert_eq!(rig.engine.cancel().await.unwrap(), captured);
        let state = rig.engine.state();
        assert_eq!(state.phase, Phase::Cancelled);
        assert_eq!(state.captured_count, 0);
        assert!(rig.engine.start().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retake_mid_session_zeroes_state() {
        let rig = rig(20, 5, eligible(), false, Duration::ZERO);
        rig.engine.start().await.unwrap();
        advance(500).await;

        let once = rig.engine.retake().await.unwrap();
        let twice = rig.engine.retake().await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.phase, Phase::Idle);
        assert_eq!(once.captured_count, 0);
        assert_eq!(once.current_pose, Pose::Front);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guidance_tracks_running_session() {
        let rig = rig(70, 50, Ok(DetectionSample::new(true, false)), false, Duration::ZERO);
        rig.engine.start().await.unwrap();
        advance(300).await;
        let g = rig.engine.guidance();
        assert_eq!(g.headline, "Look straight at the camera");
        assert_eq!(g.detail, "Centre your face inside the guide");
    }
}
