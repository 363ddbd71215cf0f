//! Bus configuration loader for Cirrus.
//!
//! Reads `cirrus.toml` from a config directory and deserializes it into
//! [`BusConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::Path;

use cirrus_types::config::BusConfig;

/// File name looked up inside the config directory.
pub const CONFIG_FILE_NAME: &str = "cirrus.toml";

/// Lower bound on receive concurrency; zero workers would never deliver.
const MIN_CONCURRENCY: usize = 1;

/// Lower bound on delivery attempts; every message gets at least one try.
const MIN_DELIVERY_ATTEMPTS: u32 = 1;

/// Load bus configuration from `{config_dir}/cirrus.toml`.
///
/// - If the file does not exist, returns [`BusConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config, with receiver limits clamped to
///   usable minimums.
pub async fn load_bus_config(config_dir: &Path) -> BusConfig {
    let config_path = config_dir.join(CONFIG_FILE_NAME);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE_NAME} found at {}, using defaults", config_path.display());
            return BusConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return BusConfig::default();
        }
    };

    match toml::from_str::<BusConfig>(&content) {
        Ok(config) => normalize(config),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            BusConfig::default()
        }
    }
}

fn normalize(mut config: BusConfig) -> BusConfig {
    if config.receiver.concurrency < MIN_CONCURRENCY {
        tracing::warn!(
            configured = config.receiver.concurrency,
            "receiver.concurrency below minimum, clamping to {MIN_CONCURRENCY}"
        );
        config.receiver.concurrency = MIN_CONCURRENCY;
    }
    if config.receiver.max_delivery_attempts < MIN_DELIVERY_ATTEMPTS {
        tracing::warn!(
            configured = config.receiver.max_delivery_attempts,
            "receiver.max_delivery_attempts below minimum, clamping to {MIN_DELIVERY_ATTEMPTS}"
        );
        config.receiver.max_delivery_attempts = MIN_DELIVERY_ATTEMPTS;
    }
    config
}
