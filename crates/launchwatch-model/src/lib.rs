//! # launchwatch-model - Launch, Tab & Server Model
//!
//! Thread-safe model of everything a debugging session has running: launch
//! configurations, the browser tabs and server connected to them, and the
//! hierarchical log each tab and server keeps.
//!
//! Mutations may arrive from any thread. Each node guards its own state with a
//! private mutex and publishes events only after releasing it, so listeners are
//! free to call straight back into the model.
//!
//! ## Public API
//!
//! ### Model (`registry`, `launch`, `browser_tab`, `server`)
//! - [`Registry`] - Owns all launches, the id counter and the global listeners
//! - [`LaunchConfiguration`] - One external launch; aggregates tabs and a server
//! - [`BrowserTab`] - Connected browser tab with a terminated/active state machine
//! - [`Server`] - The launch's development server
//! - [`ModelNode`] - Capability shared by the three node kinds
//!
//! ### Logs (`log`)
//! - [`Log`] - Per-entity entry tree with disclosure and attention propagation
//! - [`LogEntryData`], [`LogEntryView`], [`EntryId`], [`ModuleHandle`]
//!
//! ### Events (`events`)
//! - [`ModelListener`], [`LogListener`] - Callback contracts
//! - [`ModelEvent`], [`LogEvent`] - Event values published after each mutation
//! - [`ChannelForwarder`] - Forwards events into a tokio channel
//!
//! ### Configuration (`config`)
//! - [`ModelSettings`], [`load_settings()`], [`load_settings_file()`], [`init_config_dir()`]

pub mod browser_tab;
pub mod config;
pub mod events;
pub mod ids;
pub mod launch;
pub mod log;
pub mod node;
pub mod registry;
pub mod server;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use browser_tab::{BrowserTab, BrowserTabInfo};
pub use config::{
    init_config_dir, load_settings, load_settings_file, LaunchSettings, ModelSettings,
};
pub use events::{ChannelForwarder, ForwardedEvent, ListenerSet, ModelEvent, ModelListener};
pub use ids::{IdIssuer, NodeId};
pub use launch::{LaunchConfiguration, LaunchHandle};
pub use log::{
    EntryId, HelpInfo, Log, LogEntryData, LogEntryView, LogEvent, LogListener, LogOwner,
    ModuleHandle,
};
pub use node::ModelNode;
pub use registry::Registry;
pub use server::Server;
