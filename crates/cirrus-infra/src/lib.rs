//! Infrastructure layer for Cirrus.
//!
//! Contains implementations of the transport ports defined in `cirrus-core`
//! (an in-process queue/topic transport) and the `cirrus.toml` loader.

pub mod config;
pub mod memory;

pub use memory::{InMemoryReceiver, InMemoryTransport};
