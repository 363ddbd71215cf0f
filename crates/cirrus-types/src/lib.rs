//! Shared domain types for Cirrus.
//!
//! This crate contains the types exchanged between the bus core and the
//! transports it runs on: the `BusMessage` envelope, its property bag,
//! the transport/lifecycle/correlation error types, and `BusConfig`.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod message;
