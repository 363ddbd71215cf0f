//! Failure annotations for abandoned messages.
//!
//! When a dispatch fails, the message is abandoned with a property bag that
//! records why, so redelivery and dead-letter tooling can show what went
//! wrong on the previous attempt.

use chrono::{DateTime, SecondsFormat, Utc};
use cirrus_types::message::MessageProperties;

use crate::dispatch::DispatchError;

/// Common prefix of every failure annotation key.
///
/// A fresh annotation set replaces all keys under this prefix, so nothing
/// from an earlier failure survives redelivery.
pub const FAILURE_PREFIX: &str = "cirrus.failure.";

/// Classification of the failure (`DispatchError::kind`).
pub const FAILURE_TYPE: &str = "cirrus.failure.type";

/// Display text of the failure.
pub const FAILURE_MESSAGE: &str = "cirrus.failure.message";

/// The error's `source()` chain, outermost first, joined with `" <- "`.
pub const FAILURE_SOURCE_CHAIN: &str = "cirrus.failure.source_chain";

/// RFC 3339 time the failure was observed.
pub const FAILURE_TIMESTAMP: &str = "cirrus.failure.timestamp";

/// Number of errors when several handlers failed for the same message.
pub const FAILURE_COUNT: &str = "cirrus.failure.count";

/// Build the abandon annotations for `error`, observed at `at`.
///
/// When several handlers failed, the first failure is described and the
/// total is recorded under [`FAILURE_COUNT`].
pub fn failure_properties(error: &DispatchError, at: DateTime<Utc>) -> MessageProperties {
    let primary = error.primary();
    let mut properties = MessageProperties::new();

    properties.insert(FAILURE_TYPE.to_string(), primary.kind().to_string());
    properties.insert(FAILURE_MESSAGE.to_string(), primary.to_string());
    properties.insert(
        FAILURE_TIMESTAMP.to_string(),
        at.to_rfc3339_opts(SecondsFormat::Micros, true),
    );

    let chain = source_chain(primary);
    if !chain.is_empty() {
        properties.insert(FAILURE_SOURCE_CHAIN.to_string(), chain.join(" <- "));
    }

    if let DispatchError::Multiple(errors) = error {
        properties.insert(FAILURE_COUNT.to_string(), errors.len().to_string());
    }

    properties
}

fn source_chain(error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = error.source();
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    chain
}
