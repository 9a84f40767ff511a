//! Application configuration management.
//!
//! Handles loading, saving, and validating beaconwatch configuration including:
//! - Sample history capacity and staleness watchdog timing
//! - Where the desired-region list is persisted
//! - Initial capabilities and authorization of the simulated radio
//! - HTTP bind address and logging mode
//!
//! Configuration is TOML. [`Config::load_layered`] additionally applies
//! `BEACONWATCH__SECTION__KEY` environment overrides on top of the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sample::{DEFAULT_HISTORY_CAPACITY, VERY_FAR_AWAY};
use crate::stream::WatchdogSettings;
use crate::types::{AuthorizationStatus, Capabilities};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "BEACONWATCH";

/// Errors raised while loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Config`].
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Layering file and environment sources failed.
    #[error("Failed to layer configuration sources: {0}")]
    LayerError(#[from] config::ConfigError),

    /// A single field holds an invalid value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ranking and staleness settings.
    pub engine: EngineConfig,
    /// Persistence of the desired-region list.
    pub storage: StorageConfig,
    /// Initial state of the simulated radio.
    pub radio: RadioConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

/// Ranking and staleness settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Entries kept per region history.
    pub history_capacity: usize,
    /// Seconds between staleness checks.
    pub watchdog_period_secs: f64,
    /// Seconds after the last real sample before a check marks a region stale.
    pub stale_threshold_secs: f64,
    /// Distance substituted for unusable readings, in meters.
    pub very_far_away_m: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            watchdog_period_secs: 5.0,
            stale_threshold_secs: 2.5,
            very_far_away_m: VERY_FAR_AWAY,
        }
    }
}

impl EngineConfig {
    /// Watchdog timing as durations. Invalid values fall back to the defaults.
    #[must_use]
    pub fn watchdog(&self) -> WatchdogSettings {
        let defaults = WatchdogSettings::default();
        WatchdogSettings {
            period: positive_secs(self.watchdog_period_secs).unwrap_or(defaults.period),
            stale_threshold: positive_secs(self.stale_threshold_secs)
                .unwrap_or(defaults.stale_threshold),
        }
    }
}

fn positive_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}

/// Persistence of the desired-region list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the desired regions. Defaults to the platform data dir.
    pub regions_path: Option<PathBuf>,
}

impl StorageConfig {
    /// The configured path, or the platform default.
    #[must_use]
    pub fn regions_path(&self) -> PathBuf {
        self.regions_path
            .clone()
            .unwrap_or_else(crate::storage::default_regions_path)
    }
}

/// Initial state of the simulated radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct RadioConfig {
    /// Whether location services start enabled.
    pub location_services_enabled: bool,
    /// Whether region monitoring is available.
    pub monitoring_available: bool,
    /// Whether ranging is available.
    pub ranging_available: bool,
    /// Initial authorization.
    pub authorization: AuthorizationStatus,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            location_services_enabled: true,
            monitoring_available: true,
            ranging_available: true,
            authorization: AuthorizationStatus::AuthorizedAlways,
        }
    }
}

impl RadioConfig {
    /// The configured capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities {
            location_services_enabled: self.location_services_enabled,
            monitoring_available: self.monitoring_available,
            ranging_available: self.ranging_available,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:3000`.
    pub bind_address: String,
    /// Production logging (JSON files plus compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            production: false,
        }
    }
}

impl ServerConfig {
    /// Parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the address does not parse.
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.bind_address
            .parse()
            .map_err(|e| ConfigError::ValidationError {
                field: "server.bind_address",
                message: format!("'{}' is not a socket address: {e}", self.bind_address),
            })
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, or invalid.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration, falling back to defaults when the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        match Self::load(path) {
            Err(ConfigError::NotFound(path)) => {
                tracing::info!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Loads an optional TOML file and applies environment overrides.
    ///
    /// Overrides use `BEACONWATCH__<SECTION>__<KEY>`, for example
    /// `BEACONWATCH__SERVER__BIND_ADDRESS=127.0.0.1:8080`.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load_layered(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let layered = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = layered.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let write_error = |source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)?;
        Ok(())
    }

    /// Checks every field, reporting all violations at once.
    ///
    /// # Errors
    ///
    /// Returns the single violation, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let engine = &self.engine;

        if engine.history_capacity == 0 {
            errors.push(ConfigError::ValidationError {
                field: "engine.history_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        for (field, value) in [
            ("engine.watchdog_period_secs", engine.watchdog_period_secs),
            ("engine.stale_threshold_secs", engine.stale_threshold_secs),
            ("engine.very_far_away_m", engine.very_far_away_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                errors.push(ConfigError::ValidationError {
                    field,
                    message: format!("must be a positive number (got {value})"),
                });
            }
        }
        if let Err(e) = self.server.socket_addr() {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Default configuration file location for this platform.
#[must_use]
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "beaconwatch").map_or_else(
        || PathBuf::from("./config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}
