//! Observability setup for Cirrus processes.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, shutdown_tracing};
