use rollcall_core::{AlignmentCheck, PolicyError, SessionPolicy};
use rollcall_hw::SimulationProfile;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid capture policy: {0}")]
    Policy(#[from] PolicyError),
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error(
        "detection interval ({detection_ms} ms) must not be slower than capture interval ({capture_ms} ms)"
    )]
    DetectionSlowerThanCapture { detection_ms: u64, capture_ms: u64 },
    #[error("{0} must be a finite probability between 0 and 1")]
    InvalidProbability(&'static str),
    #[error("sim_jitter must be finite")]
    InvalidJitter,
}

/// Daemon configuration: defaults, then an optional TOML file, then `ROLLCALL_*` variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Images required for a full enrollment.
    pub total_target: usize,
    /// Images below which completion is refused.
    pub minimum_acceptable: usize,
    /// Capture-attempt cadence.
    pub capture_interval_ms: u64,
    /// Detector sampling cadence. Must be at least as fast as the capture cadence.
    pub detection_interval_ms: u64,
    /// Upper bound on a single detector call before the tick counts as "no face".
    pub detector_timeout_ms: u64,
    /// Directory that receives submission manifests.
    pub spool_dir: PathBuf,
    /// Alignment thresholds for the detector.
    pub alignment: AlignmentCheck,
    /// Probability that the simulated detector sees a face on a tick.
    pub sim_face_probability: f64,
    /// Per-axis face jitter of the simulated detector.
    pub sim_jitter: f32,
    /// Probability that a simulated capture fails.
    pub sim_capture_failure_rate: f64,
    /// Latency of a simulated capture.
    pub sim_capture_latency_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let policy = SessionPolicy::default();
        Self {
            total_target: policy.total_target(),
            minimum_acceptable: policy.minimum_acceptable(),
            capture_interval_ms: 300,
            detection_interval_ms: 100,
            detector_timeout_ms: 250,
            spool_dir: default_data_dir().join("spool"),
            alignment: AlignmentCheck::default(),
            sim_face_probability: 0.9,
            sim_jitter: 0.15,
            sim_capture_failure_rate: 0.05,
            sim_capture_latency_ms: 40,
        }
    }
}

impl Config {
    /// Load configuration from `ROLLCALL_CONFIG` (if set) and `ROLLCALL_*` variables,
    /// returning it together with the validated capture policy.
    pub fn load() -> Result<(Self, SessionPolicy), ConfigError> {
        let mut config = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        let policy = config.validate()?;
        Ok((config, policy))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay values from `lookup` (normally the process environment).
    ///
    /// Unparseable values are ignored and the previous value kept.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_parse(&mut self.total_target, lookup("ROLLCALL_TOTAL_TARGET"));
        override_parse(
            &mut self.minimum_acceptable,
            lookup("ROLLCALL_MINIMUM_ACCEPTABLE"),
        );
        override_parse(
            &mut self.capture_interval_ms,
            lookup("ROLLCALL_CAPTURE_INTERVAL_MS"),
        );
        override_parse(
            &mut self.detection_interval_ms,
            lookup("ROLLCALL_DETECTION_INTERVAL_MS"),
        );
        override_parse(
            &mut self.detector_timeout_ms,
            lookup("ROLLCALL_DETECTOR_TIMEOUT_MS"),
        );
        override_parse(
            &mut self.sim_face_probability,
            lookup("ROLLCALL_SIM_FACE_PROBABILITY"),
        );
        override_parse(&mut self.sim_jitter, lookup("ROLLCALL_SIM_JITTER"));
        override_parse(
            &mut self.sim_capture_failure_rate,
            lookup("ROLLCALL_SIM_CAPTURE_FAILURE_RATE"),
        );
        override_parse(
            &mut self.sim_capture_latency_ms,
            lookup("ROLLCALL_SIM_CAPTURE_LATENCY_MS"),
        );
        if let Some(dir) = lookup("ROLLCALL_SPOOL_DIR") {
            self.spool_dir = PathBuf::from(dir);
        }
    }

    /// Check cross-field constraints and build the capture policy.
    pub fn validate(&self) -> Result<SessionPolicy, ConfigError> {
        if self.capture_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("capture_interval_ms"));
        }
        if self.detection_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("detection_interval_ms"));
        }
        if self.detector_timeout_ms == 0 {
            return Err(ConfigError::ZeroInterval("detector_timeout_ms"));
        }
        if self.detection_interval_ms > self.capture_interval_ms {
            return Err(ConfigError::DetectionSlowerThanCapture {
                detection_ms: self.detection_interval_ms,
                capture_ms: self.capture_interval_ms,
            });
        }
        for (name, rate) in [
            ("sim_face_probability", self.sim_face_probability),
            ("sim_capture_failure_rate", self.sim_capture_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::InvalidProbability(name));
            }
        }
        if !self.sim_jitter.is_finite() {
            return Err(ConfigError::InvalidJitter);
        }
        Ok(SessionPolicy::new(
            self.total_target,
            self.minimum_acceptable,
        )?)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.detector_timeout_ms)
    }

    pub fn simulation_profile(&self) -> SimulationProfile {
        SimulationProfile {
            face_probability: self.sim_face_probability,
            jitter: self.sim_jitter,
            outage_rate: 0.0,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn override_parse<T: std::str::FromStr>(slot: &mut T, value: Option<String>) {
    if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
        *slot = parsed;
    }
}
