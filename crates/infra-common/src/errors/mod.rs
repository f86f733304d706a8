//! Error types shared across the workspace infrastructure.

pub mod context;
pub mod types;
