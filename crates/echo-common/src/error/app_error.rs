//! Application error types
//!
//! Errors that can surface while wiring the sync layer together. Runtime
//! failures inside the engine never reach callers; they are logged and
//! recovered from locally.

use echo_core::DomainError;
use std::fmt;

use crate::config::ConfigError;
use crate::telemetry::TracingError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] TracingError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Get a stable error code
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Telemetry(_) => "TELEMETRY_ERROR",
            Self::Domain(e) => e.code(),
            Self::MissingCollaborator(_) => "MISSING_COLLABORATOR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if the error comes from configuration or wiring
    #[must_use]
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Telemetry(_) | Self::MissingCollaborator(_)
        )
    }

    /// Create a missing collaborator error
    #[must_use]
    pub fn missing(what: &'static str) -> Self {
        Self::MissingCollaborator(what)
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    /// Create an internal error from a message
    #[must_use]
    pub fn internal_msg(msg: impl fmt::Display) -> Self {
        Self::Internal(anyhow::anyhow!(msg.to_string()))
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
