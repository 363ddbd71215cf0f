//! Bus configuration types for Cirrus.
//!
//! `BusConfig` represents the `cirrus.toml` that controls receiver
//! concurrency, redelivery limits, multicast timeouts, and telemetry export.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a bus instance.
///
/// All fields have sensible defaults, so an empty file is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub receiver: ReceiverConfig,

    #[serde(default)]
    pub multicast: MulticastConfig,

    #[serde(default)]
    pub observe: ObserveConfig,
}

/// How messages are pulled from the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Number of concurrent receive loops per receiver.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deliveries after which an abandoned message is dead-lettered.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
}

fn default_concurrency() -> usize {
    4
}

fn default_max_delivery_attempts() -> u32 {
    5
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_delivery_attempts: default_max_delivery_attempts(),
        }
    }
}

/// Multicast request/response settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticastConfig {
    /// Collection window used when a caller does not pass a timeout.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl MulticastConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

/// Telemetry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObserveConfig {
    /// Bridge tracing spans to OpenTelemetry.
    #[serde(default)]
    pub enable_otel: bool,
}
