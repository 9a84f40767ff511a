//! Unified error types for the beaconwatch core library.
//!
//! This module provides a unified error type [`BeaconError`] that covers all failure
//! modes across the engine. Each module also has its own specific error type
//! (`RegionError`, `ConfigError`, `StoreError`, `SortWeightError`) for internal use.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **Context preservation**: Wrapped errors maintain their original context
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! # Example
//!
//! ```rust
//! use beaconwatch_core::error::{BeaconError, Result};
//! use std::path::PathBuf;
//!
//! fn load_config(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(BeaconError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::region::RegionError;
use crate::sort_weight::SortWeightError;
use crate::types::{AuthorizationStatus, Capability};

/// The unified error type for all beaconwatch operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    // =========================================================================
    // PLATFORM ERRORS
    // =========================================================================
    /// A capability required for reconciliation is missing.
    #[error("{0}. Reconciliation skipped; retry once the capability changes.")]
    CapabilityUnavailable(Capability),

    /// Location authorization is insufficient; it has been requested.
    #[error("Location authorization is insufficient ({0}). Waiting for the user to grant access.")]
    AuthorizationInsufficient(AuthorizationStatus),

    /// The engine task is no longer running.
    #[error("The engine has stopped")]
    EngineStopped,

    // =========================================================================
    // REGION ERRORS
    // =========================================================================
    /// A region could not be built or decoded.
    #[error("Invalid region: {0}")]
    InvalidRegion(#[from] RegionError),

    /// Two sort weights built from different schemas were compared.
    #[error("Invalid ranking: {0}")]
    SortWeight(#[from] SortWeightError),

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
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beaconwatch operations.
pub type Result<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Returns `true` if this error comes from platform capabilities or authorization.
    #[inline]
    #[must_use]
    pub const fn is_capability_error(&self) -> bool {
        matches!(
            self,
            Self::CapabilityUnavailable(_) | Self::AuthorizationInsufficient(_)
        )
    }

    /// Returns `true` if this error is about region data.
    #[inline]
    #[must_use]
    pub const fn is_region_error(&self) -> bool {
        matches!(self, Self::InvalidRegion(_) | Self::SortWeight(_))
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

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if this error represents an expected operational state.
    ///
    /// Waiting for authorization is not a failure; the engine resumes on its own
    /// once the platform reports a change.
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        matches!(self, Self::AuthorizationInsufficient(_))
    }

    /// Returns `true` if this error is likely recoverable without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::AuthorizationInsufficient(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidRegion(_) => 400,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 404 Not Found
            Self::ConfigNotFound(_) => 404,

            // 500 Internal Server Error - server-side issues
            Self::SortWeight(_) | Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 503 Service Unavailable - platform not ready
            Self::CapabilityUnavailable(_)
            | Self::AuthorizationInsufficient(_)
            | Self::EngineStopped => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::CapabilityUnavailable(_) => "CAPABILITY_UNAVAILABLE",
            Self::AuthorizationInsufficient(_) => "AUTHORIZATION_INSUFFICIENT",
            Self::EngineStopped => "ENGINE_STOPPED",
            Self::InvalidRegion(_) => "INVALID_REGION",
            Self::SortWeight(_) => "SORT_WEIGHT_MISMATCH",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for BeaconError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {}", path.display(), source))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::LayerError(e) => Self::ConfigParseError(e.to_string()),
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

impl From<crate::storage::StoreError> for BeaconError {
    fn from(err: crate::storage::StoreError) -> Self {
        use crate::storage::StoreError;
        match err {
            StoreError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {}", path.display(), source))
            }
            StoreError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            StoreError::CreateDirError { path, source } => Self::PersistenceError(format!(
                "Failed to create directory {}: {}",
                path.display(),
                source
            )),
            StoreError::ParseError { path, source } => {
                Self::PersistenceError(format!("Failed to parse {}: {}", path.display(), source))
            }
            StoreError::SerializeError(e) => Self::PersistenceError(e.to_string()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
