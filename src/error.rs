//! Custom error types for the application.
//!
//! This module defines the primary error type, `AishError`, together with the
//! narrower error enums each component returns. Using the `thiserror` crate, it
//! provides a centralized and consistent way to report the failures the queue
//! scheduler can run into.
//!
//! ## Error Hierarchy
//!
//! - **`ValidationError`**: bad or missing operator input. The operation is
//!   rejected and no state is mutated; the operator fixes the form and retries.
//! - **`IndexError`**: a queue position outside the current queue. UI call
//!   sites only pass indices they just rendered, so this signals a stale view.
//! - **`ControlError`**: a run-control request that cannot be honoured in the
//!   current state (e.g. starting an empty queue).
//! - **`GatewayError`**: the remote instrument service could not be reached or
//!   answered garbage. The scheduler logs it and treats the tick as a no-op.
//! - **`ConfigError`**: configuration loading or validation failed.
//!
//! None of these are fatal to the process. By using `#[from]`, `AishError` can
//! be created from any of them with the `?` operator.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, AishError>;

/// Application-wide error.
#[derive(Error, Debug)]
pub enum AishError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("Remote instrument unavailable: {0}")]
    RemoteUnavailable(#[from] GatewayError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Scheduler is no longer running")]
    SchedulerStopped,
}

/// Rejected operator input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Please fill out all fields (missing {0})")]
    MissingField(&'static str),

    #[error("Angle '{0}' is not a number")]
    NonNumericAngle(String),

    #[error("Heating parameter '{0}' is not a number")]
    NonNumericTemperature(String),

    #[error("Number of scans must be at least 1")]
    InvalidScanCount,

    #[error("Precision must be Low or High, not '{0}'")]
    InvalidPrecision(String),

    #[error("Sample {sample} does not exist (slots 0..{slots})")]
    UnknownSample { sample: u32, slots: u32 },
}

/// Queue position out of bounds.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Queue index {index} out of bounds (length {len})")]
pub struct IndexError {
    /// The offending index.
    pub index: usize,
    /// Queue length at the time of the call.
    pub len: usize,
}

/// Run-control request rejected by the controller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("No items in the queue to start")]
    QueueEmpty,
}

/// Transport-level failure talking to the instrument service.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Instrument service returned HTTP {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Could not decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("Instrument service unreachable at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },
}

impl GatewayError {
    /// Whether the request provably never reached the instrument.
    ///
    /// Only a failed connection qualifies. A timeout, an error status or an
    /// undecodable body may all follow a request the instrument acted on.
    pub fn is_undelivered(&self) -> bool {
        matches!(self, GatewayError::Unreachable { .. })
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::LoadError(Box::new(err))
    }
}
