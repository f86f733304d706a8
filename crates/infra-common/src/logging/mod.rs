//! Subscriber setup for the `tracing` facade.

pub mod setup;
