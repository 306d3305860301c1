//! Model error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    // ─────────────────────────────────────────────────────────────
    // Model Invariant Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Launch configuration {launch} already has a server")]
    ServerAlreadySet { launch: String },

    #[error("Log entry {entry} does not belong to this log")]
    UnknownLogEntry { entry: usize },

    #[error("No launch configuration matches: {key}")]
    UnknownLaunch { key: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    // ─────────────────────────────────────────────────────────────
    // External Launch Errors
    // ─────────────────────────────────────────────────────────────
    #[error("External launch error: {message}")]
    Launch { message: String },

    // ─────────────────────────────────────────────────────────────
    // Replay Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Replay error on line {line}: {message}")]
    Replay { line: usize, message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn server_already_set(launch: impl Into<String>) -> Self {
        Self::ServerAlreadySet {
            launch: launch.into(),
        }
    }

    pub fn unknown_log_entry(entry: usize) -> Self {
        Self::UnknownLogEntry { entry }
    }

    pub fn unknown_launch(key: impl Into<String>) -> Self {
        Self::UnknownLaunch { key: key.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    pub fn replay(line: usize, message: impl Into<String>) -> Self {
        Self::Replay {
            line,
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnknownLogEntry { .. }
                | Error::UnknownLaunch { .. }
                | Error::Launch { .. }
                | Error::Replay { .. }
        )
    }

    /// Check if this error indicates a broken model invariant
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ServerAlreadySet { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
