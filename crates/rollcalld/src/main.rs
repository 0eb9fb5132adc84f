use anyhow::Result;
use rollcall_hw::{SimulatedCamera, SimulatedDetector};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod submit;

const BUS_NAME: &str = "org.rollcall.Enrollment1";
const OBJECT_PATH: &str = "/org/rollcall/Enrollment1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let (config, policy) = config::Config::load()?;

    let detector = SimulatedDetector::new(config.simulation_profile(), config.alignment);
    let camera = SimulatedCamera::new(
        Duration::from_millis(config.sim_capture_latency_ms),
        config.sim_capture_failure_rate,
    );
    let submitter = submit::SpoolSubmitter::new(&config.spool_dir);
    tracing::info!(spool = %config.spool_dir.display(), "submissions spooled to disk");

    let settings = engine::EngineSettings {
        policy,
        capture_interval: config.capture_interval(),
        detection_interval: config.detection_interval(),
        detector_timeout: config.detector_timeout(),
    };
    let engine = engine::spawn_engine(settings, detector, camera, submitter);

    let service = dbus_interface::EnrollmentService { engine };
    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
