//! Log entry payloads, module handles and entry snapshots.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use launchwatch_core::AttentionLevel;

use crate::ids::NodeId;

/// Position of an entry inside its log's arena.
///
/// Only meaningful for the [`Log`](super::Log) that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    /// The sentinel root of every log
    pub const ROOT: EntryId = EntryId(0);

    pub fn is_root(self) -> bool {
        self.0 == 0
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// One loaded module instance inside a connected process.
///
/// Each handle owns an independent, reliably sequenced stream of log entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleHandle {
    pub name: String,
    pub session_key: String,
}

impl ModuleHandle {
    pub fn new(name: impl Into<String>, session_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session_key: session_key.into(),
        }
    }
}

/// Help text and/or link attached to a log entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpInfo {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Payload reported by a connected process for one log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntryData {
    pub label: String,

    #[serde(default)]
    pub details: Option<String>,

    /// Raw severity label ("ERROR", "WARN", ...). Kept verbatim; see [`Self::level`].
    pub log_level: String,

    #[serde(default)]
    pub help_info: Option<HelpInfo>,

    #[serde(default = "Local::now")]
    pub timestamp: DateTime<Local>,

    #[serde(default)]
    pub needs_attention: bool,
}

impl LogEntryData {
    pub fn new(label: impl Into<String>, log_level: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            details: None,
            log_level: log_level.into(),
            help_info: None,
            timestamp: Local::now(),
            needs_attention: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_help_info(mut self, help_info: HelpInfo) -> Self {
        self.help_info = Some(help_info);
        self
    }

    /// Mark this entry as one the user should look at
    pub fn needing_attention(mut self) -> Self {
        self.needs_attention = true;
        self
    }

    /// Parsed severity, `None` when the label is outside the vocabulary
    pub fn level(&self) -> Option<AttentionLevel> {
        AttentionLevel::parse(&self.log_level)
    }

    /// Level this entry pushes up the tree, if any
    pub fn attention_signal(&self) -> Option<AttentionLevel> {
        if self.needs_attention {
            self.level()
        } else {
            None
        }
    }
}

/// Immutable snapshot of one entry, safe to hand to listeners.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntryView {
    pub id: EntryId,
    /// Entity owning the log this entry lives in
    pub owner: NodeId,
    pub parent: Option<EntryId>,
    pub data: Option<LogEntryData>,
    pub index: u64,
    pub module: Option<ModuleHandle>,
    pub disclosed: bool,
    pub attention_level: Option<AttentionLevel>,
    pub child_count: usize,
}

impl LogEntryView {
    pub fn label(&self) -> &str {
        self.data.as_ref().map(|d| d.label.as_str()).unwrap_or("")
    }

    /// Whether this entry itself asked for attention (vs. inheriting it)
    pub fn is_attention_source(&self) -> bool {
        self.data.as_ref().is_some_and(|d| d.needs_attention)
    }
}
