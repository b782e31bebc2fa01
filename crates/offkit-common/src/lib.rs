//! # Offkit Common
//!
//! Shared plumbing for the offkit crates.
//!
//! Diagnostics are never gated by a global flag. The composition root picks a
//! [`LogConfig`] (including [`LogConfig::silent`]) and installs it once with
//! [`init_logging`]; every other crate only emits `tracing` events.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LoggingError};
