//! Error types for hvac-core.
//!
//! None of these errors are fatal to the engine. The reconciliation loop
//! turns every failure into either a scheduled retry or "keep showing the
//! last-known-good state". They surface to callers only through the
//! control methods on [`crate::EngineHandle`] and through the building
//! blocks when used directly.
//!
//! # Recovery
//!
//! | Error Type | Engine behaviour |
//! |------------|------------------|
//! | [`Error::Transport`] | Channel marked disconnected, reconnect after the back-off delay |
//! | [`Error::Api`] | Logged, zone keeps its last state until the next refresh cycle |
//! | [`Error::InvalidSetpoint`] | Returned to the caller, nothing is sent |
//! | [`Error::InvalidConfig`] | Returned from the builder, fix configuration and restart |
//! | [`Error::EngineStopped`] | The engine task has exited (after `shutdown`) |
//! | [`Error::Cancelled`] | Operation interrupted by teardown |

use thiserror::Error;

use crate::api::ApiError;
use crate::transport::TransportError;

/// Errors that can occur in the reconciliation engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Push channel failure.
    #[error("Push channel error: {0}")]
    Transport(#[from] TransportError),

    /// REST call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Invalid configuration parameter.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Setpoint rejected before reaching the server.
    #[error("Setpoint {value}°C is invalid (allowed {min}-{max}°C in {step}°C steps)")]
    InvalidSetpoint {
        value: f64,
        min: f64,
        max: f64,
        step: f64,
    },

    /// The engine task is no longer running.
    #[error("Engine has stopped")]
    EngineStopped,

    /// Operation was cancelled by teardown.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias using hvac-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("refresh interval must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: refresh interval must be > 0"
        );

        let err = Error::InvalidSetpoint {
            value: 31.0,
            min: 15.0,
            max: 28.0,
            step: 0.5,
        };
        assert!(err.to_string().contains("31"));
        assert!(err.to_string().contains("15-28"));
    }

    #[test]
    fn test_api_error_is_transparent() {
        let err: Error = ApiError::Status {
            status: 404,
            message: "Zone not found".to_string(),
        }
        .into();
        assert!(err.to_string().contains("Zone not found"));
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: Error = TransportError::Closed.into();
        assert!(matches!(err, Error::Transport(TransportError::Closed)));
    }
}
