//! Shared infrastructure for the switchboard workspace.
//!
//! This crate owns the pieces every other crate leans on but none of them
//! should implement twice: subscriber setup for `tracing`, the layered
//! configuration model, and the error/context types used while loading it.

pub mod config;
pub mod errors;
pub mod logging;

pub use config::SwitchboardConfig;
pub use errors::context::{ErrorContext, ErrorExt};
pub use errors::types::{Error, Result};
pub use logging::setup::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
