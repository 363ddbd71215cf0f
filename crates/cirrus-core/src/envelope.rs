//! Helper constructors for `BusMessage` envelopes.
//!
//! Reduces boilerplate when building one-way commands, multicast requests,
//! and replies.

use chrono::Utc;
use cirrus_types::message::{BusMessage, MessageProperties};
use uuid::Uuid;

/// Build a one-way message with no reply address.
pub fn command(
    destination: impl Into<String>,
    body_type: impl Into<String>,
    body: serde_json::Value,
) -> BusMessage {
    BusMessage {
        id: Uuid::now_v7(),
        correlation_id: None,
        reply_to: None,
        destination: destination.into(),
        body_type: body_type.into(),
        body,
        enqueued_at: Utc::now(),
        delivery_count: 1,
        properties: MessageProperties::new(),
    }
}

/// Build a request whose replies should be sent to `reply_to`.
///
/// The request's `id` doubles as the correlation id replies will carry.
pub fn request(
    destination: impl Into<String>,
    reply_to: impl Into<String>,
    body_type: impl Into<String>,
    body: serde_json::Value,
) -> BusMessage {
    BusMessage {
        reply_to: Some(reply_to.into()),
        ..command(destination, body_type, body)
    }
}

/// Build a reply to `original`, addressed to its `reply_to`.
///
/// Returns `None` when the original carries no reply address.
pub fn reply(
    original: &BusMessage,
    body_type: impl Into<String>,
    body: serde_json::Value,
) -> Option<BusMessage> {
    let destination = original.reply_to.clone()?;
    Some(BusMessage {
        correlation_id: Some(original.id),
        ..command(destination, body_type, body)
    })
}
