//! Unified error types for the drivesafe core library.
//!
//! [`DriveSafeError`] covers the failures that reach a caller: a bad or
//! unreachable sensor, a worker that is already running or has crashed, a
//! rejected inbound event and broken configuration. Each module keeps its own
//! error type (`ConfigError`, `SourceError`) and converts into this one.
//!
//! Gateway and audit failures never surface here: the dispatcher logs them,
//! audits them where possible and carries on.
//!
//! # Example
//!
//! ```rust
//! use drivesafe_core::error::{DriveSafeError, Result};
//!
//! fn require_sender(from: &str) -> Result<()> {
//!     if from.trim().is_empty() {
//!         return Err(DriveSafeError::InvalidInboundMessage("missing sender".into()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The unified error type for all drivesafe operations.
#[derive(Debug, Error)]
pub enum DriveSafeError {
    // =========================================================================
    // SENSOR ERRORS
    // =========================================================================
    /// The configured sensor source string could not be understood.
    #[error("Invalid sensor source '{0}'. Use a device path such as /dev/serial0 or tcp://host:port.")]
    InvalidSensorSource(String),

    /// The sensor source could not be opened.
    #[error("Failed to open sensor source: {0}. Check wiring and device permissions.")]
    SensorOpenFailed(String),

    /// A detection worker is already running.
    #[error("Detection worker is already running")]
    DetectionAlreadyRunning,

    /// The detection worker task panicked.
    #[error("Detection worker panicked: {0}")]
    DetectionWorkerPanicked(String),

    // =========================================================================
    // INBOUND EVENT ERRORS
    // =========================================================================
    /// An inbound message was missing required fields.
    #[error("Invalid inbound message: {0}")]
    InvalidInboundMessage(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration could not be loaded or parsed.
    #[error("Failed to load configuration: {0}")]
    ConfigLoadError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),
}

/// A specialized [`Result`] type for drivesafe operations.
pub type Result<T> = std::result::Result<T, DriveSafeError>;

/// Short alias for [`DriveSafeError`].
pub type Error = DriveSafeError;

impl DriveSafeError {
    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidInboundMessage(_) | Self::InvalidSensorSource(_) => 400,

            // 409 Conflict - already running
            Self::DetectionAlreadyRunning => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigLoadError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - worker crashed
            Self::DetectionWorkerPanicked(_) => 500,

            // 503 Service Unavailable - sensor hardware issues
            Self::SensorOpenFailed(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidSensorSource(_) => "INVALID_SENSOR_SOURCE",
            Self::SensorOpenFailed(_) => "SENSOR_OPEN_FAILED",
            Self::DetectionAlreadyRunning => "DETECTION_ALREADY_RUNNING",
            Self::DetectionWorkerPanicked(_) => "DETECTION_WORKER_PANICKED",
            Self::InvalidInboundMessage(_) => "INVALID_INBOUND_MESSAGE",
            Self::ConfigLoadError(_) => "CONFIG_LOAD_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for DriveSafeError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::Load(e) => Self::ConfigLoadError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::source::SourceError> for DriveSafeError {
    fn from(err: crate::source::SourceError) -> Self {
        use crate::source::SourceError;
        match err {
            SourceError::InvalidSource(source) => Self::InvalidSensorSource(source),
            SourceError::Open { endpoint, source } => {
                Self::SensorOpenFailed(format!("{endpoint}: {source}"))
            }
        }
    }
}
