//! Test utilities for model types
//!
//! Provides recording listeners, a scriptable launch handle and small builders
//! for tab infos and log entries.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use launchwatch_core::{Error, Result};

use crate::browser_tab::BrowserTabInfo;
use crate::events::{ModelEvent, ModelListener};
use crate::ids::NodeId;
use crate::launch::LaunchHandle;
use crate::log::{LogEntryData, LogEvent, LogListener};

/// Creates a log entry payload with the given label and severity.
pub fn entry(label: &str, level: &str) -> LogEntryData {
    LogEntryData::new(label, level)
}

/// Creates tab connection info without a tab key.
///
/// Every call yields a distinct physical tab as far as reuse is concerned.
pub fn tab_info(user_agent: &str, url: &str) -> BrowserTabInfo {
    BrowserTabInfo {
        tab_key: None,
        user_agent_tag: user_agent.to_string(),
        url: url.to_string(),
        remote_host: "127.0.0.1".to_string(),
        initial_session_key: "session-1".to_string(),
        icon: None,
    }
}

/// Creates tab connection info carrying a browser tab key.
pub fn keyed_tab_info(tab_key: &str, user_agent: &str, url: &str) -> BrowserTabInfo {
    BrowserTabInfo {
        tab_key: Some(tab_key.to_string()),
        ..tab_info(user_agent, url)
    }
}

// ─────────────────────────────────────────────────────────────────
// Recording Listeners
// ─────────────────────────────────────────────────────────────────

/// Model listener that remembers `(event_type, node_id)` for every event.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<(&'static str, NodeId)>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<(&'static str, NodeId)> {
        self.events.lock().clone()
    }

    /// Event type names in delivery order
    pub fn types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|(t, _)| *t == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ModelListener for RecordingListener {
    fn on_model_event(&self, event: &ModelEvent) {
        self.events.lock().push((event.event_type(), event.node_id()));
    }
}

/// Log listener that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingLogListener {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingLogListener {
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    pub fn new_entry_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, LogEvent::NewEntry { .. }))
            .count()
    }
}

impl LogListener for RecordingLogListener {
    fn on_log_event(&self, event: &LogEvent) {
        self.events.lock().push(event.clone());
    }
}

// ─────────────────────────────────────────────────────────────────
// Stub Launch
// ─────────────────────────────────────────────────────────────────

/// Launch handle whose web server restarts can be counted and made to fail.
#[derive(Debug)]
pub struct StubLaunch {
    key: String,
    fail_restarts: AtomicBool,
    restarts: AtomicUsize,
}

impl StubLaunch {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            fail_restarts: AtomicBool::new(false),
            restarts: AtomicUsize::new(0),
        }
    }

    /// A launch whose restarts always fail
    pub fn failing(key: &str) -> Self {
        let stub = Self::new(key);
        stub.fail_restarts.store(true, Ordering::SeqCst);
        stub
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl LaunchHandle for StubLaunch {
    fn launch_key(&self) -> String {
        self.key.clone()
    }

    fn restart_web_server(&self) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        if self.fail_restarts.load(Ordering::SeqCst) {
            return Err(Error::launch(format!("{} refused to restart", self.key)));
        }
        Ok(())
    }
}
