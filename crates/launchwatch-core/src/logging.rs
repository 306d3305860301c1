//! Logging configuration using tracing
//!
//! The replay binary writes its NDJSON events to stdout, so diagnostics never go
//! there: they land in a daily log file, and optionally on stderr as well.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Result, ResultExt};

/// Environment variable that overrides the log filter
pub const LOG_ENV_VAR: &str = "LAUNCHWATCH_LOG";

const DEFAULT_FILTER: &str = "launchwatch=info,launchwatch_model=info,warn";
const LOG_FILE_NAME: &str = "launchwatch.log";

/// Where diagnostics go besides the log file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mirror {
    #[default]
    None,
    /// Also print warnings and errors on stderr
    Stderr,
}

/// Initialize the logging subsystem and return the current log file
///
/// Logs are written to `~/.local/share/launchwatch/logs/`.
/// Log level is controlled by the `LAUNCHWATCH_LOG` environment variable.
///
/// # Examples
/// ```bash
/// LAUNCHWATCH_LOG=debug launchwatch replay session.jsonl
/// LAUNCHWATCH_LOG=launchwatch_model=trace launchwatch replay session.jsonl
/// ```
pub fn init(mirror: Mirror) -> Result<PathBuf> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir).context("creating log directory")?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    let env_filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = (mirror == Mirror::Stderr).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .with_filter(tracing_subscriber::filter::LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                // delivery threads are the interesting axis here
                .with_thread_names(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .with(stderr_layer)
        .init();

    let log_file = current_log_file();
    tracing::info!(
        "launchwatch {} starting, logging to {}",
        env!("CARGO_PKG_VERSION"),
        log_file.display()
    );

    Ok(log_file)
}

/// Record the effective settings once they are known
pub fn log_settings(source: &str, settings: &impl std::fmt::Debug) {
    tracing::info!("Settings from {}: {:?}", source, settings);
}

fn log_directory() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("launchwatch").join("logs")
}

/// Today's file; the appender adds a date suffix when it rotates
fn current_log_file() -> PathBuf {
    log_directory().join(LOG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_lives_under_launchwatch_dir() {
        let path = current_log_file();
        assert!(path.ends_with("launchwatch/logs/launchwatch.log"));
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_mirror_defaults_to_file_only() {
        assert_eq!(Mirror::default(), Mirror::None);
    }
}
