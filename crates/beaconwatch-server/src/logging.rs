//! Logging initialization.
//!
//! Production servers write JSON to a daily rolling file and a compact copy
//! to stdout for the journal. Development builds print pretty output with
//! span open/close events, which makes the engine's command handling easy
//! to follow.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the default filter directive.
pub const LOG_LEVEL_ENV: &str = "BEACONWATCH_LOG_LEVEL";

/// Environment variable overriding [`log_directory`].
pub const LOG_DIR_ENV: &str = "BEACONWATCH_LOG_DIR";

/// Directive used when neither `RUST_LOG` nor [`LOG_LEVEL_ENV`] is set.
pub const DEFAULT_DIRECTIVE: &str = "info,beaconwatch::telemetry=info,tower_http=info";

const LOG_FILE_PREFIX: &str = "beaconwatch";

/// Writer guards; dropping one stops its background writer.
static GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Picks the filter directive: `RUST_LOG`, then [`LOG_LEVEL_ENV`], then
/// [`DEFAULT_DIRECTIVE`]. Blank values are skipped.
#[must_use]
pub fn filter_directive(rust_log: Option<&str>, level: Option<&str>) -> String {
    [rust_log, level]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVE)
        .to_string()
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid, the production log
/// directory cannot be created, or a global subscriber is already installed.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let directive = filter_directive(
        std::env::var("RUST_LOG").ok().as_deref(),
        std::env::var(LOG_LEVEL_ENV).ok().as_deref(),
    );
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter {directive:?}"))?;

    if is_production {
        init_production(filter)
    } else {
        init_development(filter)
    }
}

fn init_production(filter: EnvFilter) -> anyhow::Result<()> {
    let dir = log_directory();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        &dir,
        LOG_FILE_PREFIX,
    ));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_current_span(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_ansi(false),
        )
        .try_init()?;

    let _ = GUARDS.set((file_guard, stdout_guard));
    Ok(())
}

fn init_development(filter: EnvFilter) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        )
        .try_init()?;
    Ok(())
}

/// Where production logs go: [`LOG_DIR_ENV`] if set, otherwise
/// `/var/log/beaconwatch` on Linux or the platform data dir elsewhere.
#[must_use]
pub fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    platform_log_directory()
}

#[cfg(target_os = "linux")]
fn platform_log_directory() -> PathBuf {
    PathBuf::from("/var/log/beaconwatch")
}

#[cfg(not(target_os = "linux"))]
fn platform_log_directory() -> PathBuf {
    directories::ProjectDirs::from("", "", "beaconwatch")
        .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_precedence() {
        assert_eq!(filter_directive(Some("debug"), Some("warn")), "debug");
        assert_eq!(filter_directive(None, Some("warn")), "warn");
        assert_eq!(filter_directive(Some("  "), Some("warn")), "warn");
        assert_eq!(filter_directive(None, None), DEFAULT_DIRECTIVE);
    }

    #[test]
    fn test_default_directive_parses() {
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVE).is_ok());
    }

    #[test]
    fn test_platform_log_directory_names_the_service() {
        let dir = platform_log_directory();
        assert!(dir.to_string_lossy().contains("beaconwatch") || dir.ends_with("logs"));
    }
}
