//! Configuration system using Figment
//!
//! Configuration is layered, lowest precedence first:
//! 1. Built-in defaults ([`AppConfig::default`])
//! 2. A TOML file (default `config/coupling.toml`; a missing file is skipped)
//! 3. Environment variables prefixed with `COUPLING_DAQ_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! COUPLING_DAQ_APPLICATION__LOG_LEVEL=debug
//! COUPLING_DAQ_SCAN__STEP_RECORD=0.5
//! COUPLING_DAQ_STORAGE__OUTPUT_DIR=./save/run7
//! COUPLING_DAQ_INSTRUMENTS__ESA__ENABLED=false
//! ```
//!
//! # Example
//!
//! ```no_run
//! use coupling_daq::config::AppConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     println!("Writing checkpoints to {}", config.storage.output_dir.display());
//!     Ok(())
//! }
//! ```

use crate::{
    error::{AppResult, DaqError},
    scan::RecordingPolicy,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/coupling.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "COUPLING_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Piezo scan settings
    pub scan: ScanConfig,
    /// Checkpoint output settings
    pub storage: StorageConfig,
    /// Live display settings
    pub display: DisplayConfig,
    /// Instrument bench
    pub instruments: InstrumentsConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Polarized coupling measurement".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Piezo scan configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Target displacement between checkpoints
    pub step_record: f64,
    /// Piezo advance per loop iteration
    pub step_background: f64,
    /// Piezo position loaded on Start when none is given
    pub piezo_start: f64,
    /// File id loaded on Start when none is given
    pub file_id_start: u64,
    /// Delay between loop iterations in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            step_record: 0.1,
            step_background: 0.1,
            piezo_start: 0.0,
            file_id_start: 0,
            poll_interval_ms: 200,
        }
    }
}

impl ScanConfig {
    /// Builds the recording policy for a session.
    ///
    /// # Errors
    ///
    /// [`DaqError::ZeroRecordInterval`] or [`DaqError::Configuration`] for
    /// step combinations the trigger cannot honour.
    pub fn policy(&self) -> AppResult<RecordingPolicy> {
        RecordingPolicy::new(self.step_record, self.step_background)
    }

    /// Delay between loop iterations.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Checkpoint storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving checkpoint CSV files
    pub output_dir: PathBuf,
    /// Create `output_dir` at startup when it is missing
    pub create_dir: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("save"),
            create_dir: true,
        }
    }
}

/// Live display configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Lower bound of every plot's vertical axis, dBm
    pub y_min: f64,
    /// Upper bound of every plot's vertical axis, dBm
    pub y_max: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            y_min: -100.0,
            y_max: 10.0,
        }
    }
}

/// How an instrument is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    /// Real hardware through the VISA library
    Visa,
    /// Synthetic instrument
    Mock,
}

/// One instrument of the bench
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Transport kind
    pub kind: InstrumentKind,
    /// VISA resource string (e.g., "GPIB0::4::INSTR")
    #[serde(default)]
    pub resource: Option<String>,
    /// Session open timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Whether this instrument is polled (only honoured for the ESA)
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Instrument trace to read (e.g., "TRA" or "TRACE1")
    #[serde(default)]
    pub trace: Option<String>,
}

impl InstrumentConfig {
    /// A VISA instrument at `resource`.
    pub fn visa(resource: &str) -> Self {
        Self {
            kind: InstrumentKind::Visa,
            resource: Some(resource.to_string()),
            timeout_ms: default_timeout_ms(),
            enabled: true,
            trace: None,
        }
    }

    /// A synthetic instrument.
    pub fn mock() -> Self {
        Self {
            kind: InstrumentKind::Mock,
            resource: None,
            timeout_ms: default_timeout_ms(),
            enabled: true,
            trace: None,
        }
    }
}

/// The instruments polled every iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentsConfig {
    /// First optical spectrum analyzer (file index 1)
    pub osa1: InstrumentConfig,
    /// Second optical spectrum analyzer (file index 2)
    pub osa2: InstrumentConfig,
    /// Electrical spectrum analyzer (file index 3)
    pub esa: InstrumentConfig,
    /// Tunable laser with the scanned piezo
    pub laser: InstrumentConfig,
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        Self {
            osa1: InstrumentConfig::visa("GPIB0::4::INSTR"),
            osa2: InstrumentConfig::visa("GPIB0::1::INSTR"),
            esa: InstrumentConfig::visa("GPIB0::18::INSTR"),
            laser: InstrumentConfig::visa("USB0::0x104D::0x100A::INSTR"),
        }
    }
}

impl InstrumentsConfig {
    /// A fully synthetic bench.
    pub fn mock() -> Self {
        Self {
            osa1: InstrumentConfig::mock(),
            osa2: InstrumentConfig::mock(),
            esa: InstrumentConfig::mock(),
            laser: InstrumentConfig::mock(),
        }
    }

    /// Switches every instrument to its mock, keeping `enabled` flags.
    pub fn force_mock(&mut self) {
        for instrument in self.all_mut() {
            instrument.kind = InstrumentKind::Mock;
        }
    }

    fn all(&self) -> [(&'static str, &InstrumentConfig); 4] {
        [
            ("osa1", &self.osa1),
            ("osa2", &self.osa2),
            ("esa", &self.esa),
            ("laser", &self.laser),
        ]
    }

    fn all_mut(&mut self) -> [&mut InstrumentConfig; 4] {
        [
            &mut self.osa1,
            &mut self.osa2,
            &mut self.esa,
            &mut self.laser,
        ]
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_timeout_ms() -> u64 {
    5000
}

fn default_enabled() -> bool {
    true
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl AppConfig {
    /// Load configuration from `config/coupling.toml` and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be merged or validation fails.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// The file is optional; defaults and environment overrides still apply
    /// when it does not exist. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Config`] for unreadable or mistyped sources and
    /// the validation errors of [`validate`](Self::validate).
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Self::extract_from(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge defaults, the file at `path` and the environment without
    /// validating.
    ///
    /// For callers that apply command-line overrides before calling
    /// [`validate`](Self::validate) themselves.
    ///
    /// # Errors
    ///
    /// Returns [`DaqError::Config`] for unreadable or mistyped sources.
    pub fn extract_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Scan steps form a valid recording policy
    /// - Poll interval is non-zero
    /// - Display range is finite and non-empty
    /// - VISA instruments name a resource
    ///
    /// # Errors
    ///
    /// Returns a descriptive error for the first failed check.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.scan.policy()?;

        if self.scan.poll_interval_ms == 0 {
            return Err(DaqError::Configuration(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }

        let display = &self.display;
        if !display.y_min.is_finite() || !display.y_max.is_finite() || display.y_min >= display.y_max
        {
            return Err(DaqError::Configuration(format!(
                "Invalid display range [{}, {}]",
                display.y_min, display.y_max
            )));
        }

        for (id, instrument) in self.instruments.all() {
            if instrument.kind != InstrumentKind::Visa || !instrument.enabled {
                continue;
            }
            match &instrument.resource {
                Some(resource) if !resource.trim().is_empty() => {}
                _ => {
                    return Err(DaqError::Configuration(format!(
                        "VISA instrument '{id}': 'resource' cannot be empty"
                    )))
                }
            }
        }

        Ok(())
    }
}
