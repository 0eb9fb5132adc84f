use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{Guidance, SessionSnapshot};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face enrollment CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start or resume capturing
    Start,
    /// Pause capturing, keeping the images taken so far
    Pause,
    /// Discard all images and start over from the first pose
    Retake,
    /// Abandon the session
    Cancel,
    /// Finish the session and submit its images
    Complete {
        /// Subject (rider) id the images belong to
        #[arg(short, long)]
        subject: String,
    },
    /// Retry a failed submission
    Resubmit {
        #[arg(short, long)]
        subject: String,
    },
    /// Print the session snapshot as JSON
    State,
    /// Follow guidance until capturing stops
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 250)]
        interval_ms: u64,
    },
    /// Show daemon status
    Status,
}

// `#[zbus::proxy]` generates `EnrollmentProxy` (async), used below.
#[zbus::proxy(
    interface = "org.rollcall.Enrollment1",
    default_service = "org.rollcall.Enrollment1",
    default_path = "/org/rollcall/Enrollment1"
)]
trait Enrollment {
    async fn start(&self) -> zbus::Result<String>;
    async fn pause(&self) -> zbus::Result<String>;
    async fn retake(&self) -> zbus::Result<String>;
    async fn cancel(&self) -> zbus::Result<u32>;
    async fn complete(&self, subject_id: &str) -> zbus::Result<String>;
    async fn resubmit(&self, subject_id: &str) -> zbus::Result<String>;
    async fn state(&self) -> zbus::Result<String>;
    async fn guidance(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    let proxy = EnrollmentProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")?;
    tracing::debug!(command = ?cli.command, "calling rollcalld");

    match cli.command {
        Commands::Start => println!("{}", summarize(&parse_snapshot(&proxy.start().await?)?)),
        Commands::Pause => println!("{}", summarize(&parse_snapshot(&proxy.pause().await?)?)),
        Commands::Retake => println!("{}", summarize(&parse_snapshot(&proxy.retake().await?)?)),
        Commands::Cancel => {
            let discarded = proxy.cancel().await?;
            println!("Session cancelled; {discarded} images discarded");
        }
        Commands::Complete { subject } => {
            let receipt = proxy.complete(&subject).await?;
            println!("Submitted: {receipt}");
        }
        Commands::Resubmit { subject } => {
            let receipt = proxy.resubmit(&subject).await?;
            println!("Submitted: {receipt}");
        }
        Commands::State => println!("{}", proxy.state().await?),
        Commands::Status => println!("{}", proxy.status().await?),
        Commands::Watch { interval_ms } => watch(&proxy, Duration::from_millis(interval_ms)).await?,
    }

    Ok(())
}

/// Print guidance whenever it changes until the session stops running.
async fn watch(proxy: &EnrollmentProxy<'_>, interval: Duration) -> Result<()> {
    let mut last: Option<Guidance> = None;
    loop {
        let guidance: Guidance = serde_json::from_str(&proxy.guidance().await?)?;
        if last.as_ref() != Some(&guidance) {
            println!("{}", render_guidance(&guidance));
            last = Some(guidance);
        }

        let snapshot = parse_snapshot(&proxy.state().await?)?;
        tracing::debug!(
            phase = %snapshot.phase,
            captured = snapshot.captured_count,
            "polled session state"
        );
        if !snapshot.phase.is_running() {
            println!("{}", summarize(&snapshot));
            return Ok(());
        }
        tokio::time::sleep(interval).await;
    }
}

fn parse_snapshot(json: &str) -> Result<SessionSnapshot> {
    serde_json::from_str(json).context("daemon returned an unreadable snapshot")
}

fn render_guidance(g: &Guidance) -> String {
    format!("[{:>3}%] {}: {}", g.percent, g.headline, g.detail)
}

fn summarize(s: &SessionSnapshot) -> String {
    let poses = s
        .per_pose_counts
        .iter()
        .map(|p| format!("{} {}/{}", p.pose, p.count, p.quota))
        .collect::<Vec<_>>()
        .join(", ");
    let mut line = format!(
        "{}: {}/{} images ({poses})",
        s.phase, s.captured_count, s.total_target
    );
    if s.shortfall() > 0 {
        line.push_str(&format!("; {} more needed to submit", s.shortfall()));
    }
    line
}
