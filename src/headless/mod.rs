//! Headless replay - JSON event output for scripted sessions
//!
//! Reads a script of delivery calls (the mutations a debugger front end would
//! receive from launches, browsers and servers), applies them to a fresh
//! [`Registry`](launchwatch_model::Registry), and writes every resulting model
//! and log event to stdout as structured JSON.
//!
//! # Script Format
//!
//! One [`DeliveryCall`] per line, tagged by its `call` field. Launches, tabs,
//! servers and log entries are addressed by aliases the script chooses:
//!
//! ```json
//! {"call":"create_launch","launch":"web","name":"my app"}
//! {"call":"add_browser_tab","launch":"web","tab":"t1","user_agent":"Chrome","url":"http://localhost:8080/","module":"main","session":"s1"}
//! {"call":"append_log","node":"t1","entry":"boot","label":"Booting","level":"INFO","index":1,"module":"main","session":"s1"}
//! ```
//!
//! # Event Format
//!
//! Events are output as NDJSON (newline-delimited JSON), one event per line.
//! Each event has an "event" field indicating its type:
//!
//! ```json
//! {"event":"node","kind":"launch_configuration_launched","node":"web","node_id":1,"name":"my app","terminated":false,"attention":null,"timestamp":1704700001000}
//! {"event":"log_entry","node":"t1","entry":"boot","label":"Booting","level":"INFO","index":1,"insertion_index":0,"needs_attention":false,"parents_changed":false,"attention":null,"timestamp":1704700002000}
//! ```

pub mod runner;

use std::io::Write;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use launchwatch_core::prelude::*;
use launchwatch_core::AttentionLevel;

pub use runner::{run_replay, Replay, ReplayStats};

// ─────────────────────────────────────────────────────────────────
// Input
// ─────────────────────────────────────────────────────────────────

/// One scripted mutation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum DeliveryCall {
    /// A new external launch starts
    CreateLaunch {
        launch: String,
        name: String,
        /// Launch key reported by the handle; defaults to the alias
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        supports_restart: bool,
        /// Make every web server restart of this launch fail
        #[serde(default)]
        restart_fails: bool,
    },

    /// A browser reports its first module; reuses the tab when `tab_key` matches
    AddBrowserTab {
        launch: String,
        tab: String,
        user_agent: String,
        url: String,
        #[serde(default = "default_remote_host")]
        remote_host: String,
        #[serde(default)]
        tab_key: Option<String>,
        module: String,
        session: String,
    },

    AddModule {
        tab: String,
        module: String,
        session: String,
    },

    RemoveModule {
        tab: String,
        module: String,
        session: String,
    },

    SetServer {
        launch: String,
        server: String,
        name: String,
    },

    /// Append to the log of a tab or server; `parent` defaults to the root
    AppendLog {
        node: String,
        #[serde(default)]
        entry: Option<String>,
        #[serde(default)]
        parent: Option<String>,
        label: String,
        level: String,
        #[serde(default)]
        details: Option<String>,
        #[serde(default)]
        needs_attention: bool,
        index: u64,
        module: String,
        session: String,
    },

    SetLaunchUrls {
        launch: String,
        urls: Option<Vec<String>>,
    },

    SetSupportsRestart {
        launch: String,
        supported: bool,
    },

    /// Restart the launch's web server and wait for it to finish
    RestartWebServer {
        launch: String,
    },

    /// Terminate a launch, tab or server
    Terminate {
        node: String,
    },

    ClearLog {
        node: String,
    },

    /// Report which entry of a log should receive focus
    Focus {
        node: String,
    },

    RemoveTerminatedLaunches,
}

fn default_remote_host() -> String {
    "127.0.0.1".to_string()
}

impl DeliveryCall {
    /// Parse one script line
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

// ─────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Lifecycle change of a launch, tab or server
    Node {
        kind: String,
        node: String,
        node_id: u64,
        name: String,
        terminated: bool,
        attention: Option<AttentionLevel>,
        timestamp: i64,
    },

    /// A log entry was published
    LogEntry {
        node: String,
        entry: Option<String>,
        label: String,
        level: String,
        index: u64,
        insertion_index: usize,
        needs_attention: bool,
        parents_changed: bool,
        attention: Option<AttentionLevel>,
        timestamp: i64,
    },

    /// Entries hidden by a log clear
    LogEntriesRemoved {
        node: String,
        count: usize,
        labels: Vec<String>,
        timestamp: i64,
    },

    /// Result of a focus query
    Focus {
        node: String,
        entry: Option<String>,
        label: Option<String>,
        attention: Option<AttentionLevel>,
        /// Whether the entry asked for attention itself rather than through a child
        source: bool,
        timestamp: i64,
    },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        line: Option<usize>,
        timestamp: i64,
    },

    /// The script has been fully applied
    ReplayFinished {
        calls: usize,
        errors: usize,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Write this event as one NDJSON line and flush
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let json = serde_json::to_string(self)?;
        writeln!(out, "{}", json)?;
        out.flush()?;
        Ok(())
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn node(
        kind: &str,
        node: String,
        node_id: u64,
        name: &str,
        terminated: bool,
        attention: Option<AttentionLevel>,
    ) -> Self {
        Self::Node {
            kind: kind.to_string(),
            node,
            node_id,
            name: name.to_string(),
            terminated,
            attention,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool, line: Option<usize>) -> Self {
        Self::Error {
            message,
            fatal,
            line,
            timestamp: Self::now(),
        }
    }

    pub fn replay_finished(calls: usize, errors: usize) -> Self {
        Self::ReplayFinished {
            calls,
            errors,
            timestamp: Self::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Node { .. } => "node",
            Self::LogEntry { .. } => "log_entry",
            Self::LogEntriesRemoved { .. } => "log_entries_removed",
            Self::Focus { .. } => "focus",
            Self::Error { .. } => "error",
            Self::ReplayFinished { .. } => "replay_finished",
        }
    }
}
