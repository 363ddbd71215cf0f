//! Transport port definitions.
//!
//! These are the narrow interfaces the bus core consumes from a transport:
//! - `Receiver` -- pushes delivered messages into a callback, start/stop
//! - `Settlement` -- the per-delivery complete/abandon handle
//! - `Publisher` -- outbound sends (requests and replies)
//!
//! Implementations live in cirrus-infra (e.g., `InMemoryTransport`).

use std::future::Future;
use std::sync::Arc;

use cirrus_types::error::TransportError;
use cirrus_types::message::{BusMessage, MessageProperties};
use futures_util::future::BoxFuture;

/// Callback a `Receiver` invokes once per delivered message.
///
/// Must be safe to invoke concurrently and repeatedly.
pub type MessageCallback = Arc<dyn Fn(Delivery) -> BoxFuture<'static, ()> + Send + Sync>;

/// Transport-side resolution of one delivery.
///
/// Both methods consume the settlement, so a delivery is resolved at most
/// once. Object-safe so transports can hand out their own lock/lease types.
pub trait Settlement: Send + Sync {
    /// Acknowledge the message, removing it from the queue.
    fn complete(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>>;

    /// Return the message for redelivery, annotated with `properties`.
    fn abandon(
        self: Box<Self>,
        properties: MessageProperties,
    ) -> BoxFuture<'static, Result<(), TransportError>>;
}

/// A delivered message together with its settlement handle.
pub struct Delivery {
    message: BusMessage,
    settlement: Box<dyn Settlement>,
}

impl Delivery {
    pub fn new(message: BusMessage, settlement: impl Settlement + 'static) -> Self {
        Self {
            message,
            settlement: Box::new(settlement),
        }
    }

    pub fn message(&self) -> &BusMessage {
        &self.message
    }

    /// Complete the delivery.
    pub async fn complete(self) -> Result<(), TransportError> {
        self.settlement.complete().await
    }

    /// Abandon the delivery with diagnostic properties.
    pub async fn abandon(self, properties: MessageProperties) -> Result<(), TransportError> {
        self.settlement.abandon(properties).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message_id", &self.message.id)
            .field("body_type", &self.message.body_type)
            .field("delivery_count", &self.message.delivery_count)
            .finish()
    }
}

/// Source of inbound messages for one queue or subscription.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). The receiver
/// owns network I/O and lock renewal; it decides how many messages are in
/// flight at once.
pub trait Receiver: Send + Sync {
    /// Name of the queue or subscription, for log lines.
    fn name(&self) -> &str;

    /// Begin delivering messages to `callback`.
    ///
    /// Resolves once the receiver is actually receiving.
    fn start(
        &self,
        callback: MessageCallback,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stop receiving. Resolves after in-flight receives have drained or
    /// been cancelled.
    fn stop(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Outbound side of a transport.
pub trait Publisher: Send + Sync {
    fn publish(&self, message: BusMessage) -> BoxFuture<'_, Result<(), TransportError>>;
}
