//! # launchwatch-core - Core Types
//!
//! Foundation crate for launchwatch. Provides error handling, logging setup and
//! the attention-level vocabulary shared by the model and its consumers.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, serde_json, thiserror, toml, tracing, dirs).
//!
//! ## Public API
//!
//! ### Attention (`attention`)
//! - [`AttentionLevel`] - Severity vocabulary, ERROR through ALL
//! - [`is_more_important()`] - Label comparator for raw severity strings
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ### Logging (`logging`)
//! - [`logging::init()`] - File-backed tracing subscriber, optionally mirrored to stderr
//! - [`logging::log_settings()`] - Record the effective settings at startup
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use launchwatch_core::prelude::*;
//! ```

pub mod attention;
pub mod error;
pub mod logging;
pub mod prelude;

pub use attention::{is_more_important, AttentionLevel};
pub use error::{Error, Result, ResultExt};
