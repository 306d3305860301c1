//! launchwatch Library
//!
//! Headless front end for the launch/tab/server model: replays scripted
//! delivery calls and reports every model and log event as NDJSON.

pub mod headless;

// Re-export main entry points
pub use headless::{run_replay, DeliveryCall, HeadlessEvent, Replay, ReplayStats};
