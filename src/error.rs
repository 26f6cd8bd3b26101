//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it gives one consistent way to report the
//! failures the acquisition loop has to tell apart:
//!
//! - **`Config`**: wraps errors from `figment` while loading the TOML file or
//!   environment overrides.
//! - **`Configuration`** / **`ZeroRecordInterval`**: semantic errors in the
//!   configuration. These are fatal and are raised before any scan begins.
//! - **`Instrument`** / **`Parse`**: a read or command failed, or an instrument
//!   answered with something that is not a numeric series. The scan loop
//!   treats these as recoverable and retries on the next iteration.
//! - **`Io`** / **`Csv`**: checkpoint file failures, also recoverable.
//! - **`FeatureNotEnabled`**: functionality compiled out via feature flags
//!   (e.g. VISA support), with a message telling the user how to enable it.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors raised by the acquisition crate.
#[derive(Error, Debug)]
pub enum DaqError {
    /// The configuration sources could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The configuration parsed but holds an invalid value.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A recording interval of zero cannot define checkpoint multiples.
    #[error("Configuration validation error: recording step must be non-zero")]
    ZeroRecordInterval,

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or writing failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An instrument command or read failed.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// An instrument response could not be interpreted.
    #[error("Failed to parse instrument response: {0}")]
    Parse(String),

    /// The requested functionality was compiled out.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    /// The scan controller task is no longer running.
    #[error("Scan controller is not running")]
    ChannelClosed,

    /// The controller has not drained earlier commands yet.
    #[error("Scan controller command queue is full")]
    CommandQueueFull,
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

impl DaqError {
    /// Whether the scan loop may carry on after this error.
    ///
    /// Configuration problems are fatal; everything that comes from hardware
    /// or the filesystem is retried on the next iteration.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            DaqError::Config(_)
                | DaqError::Configuration(_)
                | DaqError::ZeroRecordInterval
                | DaqError::FeatureNotEnabled(_)
        )
    }
}
