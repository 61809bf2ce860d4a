//! Unified error types for the beacon-logger core library.
//!
//! Each module keeps its own error type ([`SessionError`], [`RadioError`],
//! [`ConfigError`]) and [`BeaconError`] folds them into the three
//! operational kinds the pipeline reports:
//!
//! - **Storage unavailable**: the session file cannot be opened. The
//!   monitor stays idle.
//! - **Write failure**: one row could not be appended. The next cycle
//!   proceeds normally.
//! - **Radio communication**: a command to the scanner failed. The monitor
//!   keeps its state and waits for the next event.
//!
//! Configuration and raw I/O errors complete the set.
//!
//! [`SessionError`]: crate::session::SessionError
//! [`RadioError`]: crate::scanner::RadioError
//! [`ConfigError`]: crate::config::ConfigError

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all beacon-logger operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    // =========================================================================
    // SESSION LOG ERRORS
    // =========================================================================
    /// The session file could not be opened.
    #[error("Session log unavailable: {0}")]
    StorageUnavailable(String),

    /// A row could not be appended to the session file.
    #[error("Failed to append log row: {0}")]
    WriteFailure(String),

    // =========================================================================
    // RADIO ERRORS
    // =========================================================================
    /// A command to the scanning layer failed.
    #[error("Radio communication error: {0}")]
    RadioCommunication(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beacon-logger operations.
pub type Result<T> = std::result::Result<T, BeaconError>;

/// Short alias for [`BeaconError`].
pub type Error = BeaconError;

impl BeaconError {
    /// Returns `true` if this error is related to the session log.
    #[inline]
    #[must_use]
    pub const fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::WriteFailure(_) | Self::IoError(_)
        )
    }

    /// Returns `true` if this error came from the scanning layer.
    #[inline]
    #[must_use]
    pub const fn is_radio_error(&self) -> bool {
        matches!(self, Self::RadioCommunication(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if monitoring can carry on after this error.
    ///
    /// A lost row or a failed radio command only affects one event; an
    /// unavailable session ends the activation.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::WriteFailure(_) | Self::RadioCommunication(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 404 Not Found
            Self::ConfigNotFound(_) => 404,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::WriteFailure(_) | Self::IoError(_) => 500,

            // 503 Service Unavailable - storage or radio not usable
            Self::StorageUnavailable(_) | Self::RadioCommunication(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::WriteFailure(_) => "WRITE_FAILURE",
            Self::RadioCommunication(_) => "RADIO_COMMUNICATION_ERROR",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::session::SessionError> for BeaconError {
    fn from(err: crate::session::SessionError) -> Self {
        use crate::session::SessionError;
        match err {
            SessionError::StorageUnavailable { .. } => Self::StorageUnavailable(err.to_string()),
            SessionError::WriteFailure { .. } | SessionError::Closed { .. } => {
                Self::WriteFailure(err.to_string())
            }
        }
    }
}

impl From<crate::scanner::RadioError> for BeaconError {
    fn from(err: crate::scanner::RadioError) -> Self {
        Self::RadioCommunication(err.to_string())
    }
}

impl From<crate::config::ConfigError> for BeaconError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::WriteError { path, source } => {
                Self::IoError(std::io::Error::new(
                    source.kind(),
                    format!("Failed to write {}: {source}", path.display()),
                ))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::scanner::RadioError;
    use crate::session::SessionError;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_storage_error_classification() {
        assert!(BeaconError::StorageUnavailable("no sd card".into()).is_storage_error());
        assert!(BeaconError::WriteFailure("disk full".into()).is_storage_error());
        assert!(BeaconError::IoError(IoErr::new(ErrorKind::Other, "x")).is_storage_error());

        assert!(!BeaconError::RadioCommunication("x".into()).is_storage_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(BeaconError::WriteFailure("disk full".into()).is_recoverable());
        assert!(BeaconError::RadioCommunication("busy".into()).is_recoverable());
        assert!(!BeaconError::StorageUnavailable("gone".into()).is_recoverable());
        assert!(!BeaconError::ConfigParseError("bad".into()).is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(
            BeaconError::StorageUnavailable("x".into()).http_status_code(),
            503
        );
        assert_eq!(
            BeaconError::RadioCommunication("x".into()).http_status_code(),
            503
        );
        assert_eq!(BeaconError::WriteFailure("x".into()).http_status_code(), 500);
        assert_eq!(
            BeaconError::ConfigNotFound(PathBuf::new()).http_status_code(),
            404
        );
        assert_eq!(
            BeaconError::ConfigValidationError("x".into()).http_status_code(),
            422
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BeaconError::StorageUnavailable("x".into()).error_code(),
            "STORAGE_UNAVAILABLE"
        );
        assert_eq!(
            BeaconError::RadioCommunication("x".into()).error_code(),
            "RADIO_COMMUNICATION_ERROR"
        );
    }

    #[test]
    fn test_from_session_error() {
        let err: BeaconError = SessionError::StorageUnavailable {
            path: PathBuf::from("/sdcard/beacon"),
            source: IoErr::new(ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert!(matches!(err, BeaconError::StorageUnavailable(_)));
        assert!(err.to_string().contains("/sdcard/beacon"));

        let err: BeaconError = SessionError::Closed {
            path: PathBuf::from("a.csv"),
        }
        .into();
        assert!(matches!(err, BeaconError::WriteFailure(_)));
    }

    #[test]
    fn test_from_radio_error() {
        let err: BeaconError = RadioError::Disconnected.into();
        assert!(err.is_radio_error());
    }

    #[test]
    fn test_from_config_validation_errors() {
        let err: BeaconError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "region.name".into(),
                message: "empty".into(),
            },
            ConfigError::ValidationError {
                field: "scan.scan_period_ms".into(),
                message: "zero".into(),
            },
        ])
        .into();
        assert!(err.is_config_error());
        let message = err.to_string();
        assert!(message.contains("region.name"));
        assert!(message.contains("scan.scan_period_ms"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<BeaconError>();
        assert_sync::<BeaconError>();
    }
}
