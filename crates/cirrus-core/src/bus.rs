//! Outbound façade: one-way sends and multicast requests.

use std::sync::Arc;
use std::time::Duration;

use cirrus_types::error::BusError;
use cirrus_types::message::BusMessage;
use tracing::{debug, info, warn};

use crate::correlator::{ResponseCorrelator, deadline_after};
use crate::envelope;
use crate::transport::Publisher;

/// Issues messages onto the bus and collects multicast replies.
///
/// Replies come back through whatever pump is receiving on
/// `reply_address`; its `HandlerDispatcher` must share this bus's
/// `ResponseCorrelator`.
#[derive(Clone)]
pub struct Bus {
    publisher: Arc<dyn Publisher>,
    correlator: Arc<ResponseCorrelator>,
    reply_address: String,
    default_timeout: Duration,
}

impl Bus {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        correlator: Arc<ResponseCorrelator>,
        reply_address: impl Into<String>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            publisher,
            correlator,
            reply_address: reply_address.into(),
            default_timeout,
        }
    }

    /// Publish a one-way message.
    pub async fn send(&self, message: BusMessage) -> Result<(), BusError> {
        debug!(
            message_id = %message.id,
            destination = %message.destination,
            body_type = %message.body_type,
            "sending message"
        );
        self.publisher.publish(message).await?;
        Ok(())
    }

    /// Broadcast a request and collect every reply that arrives within
    /// `timeout`, in arrival order.
    ///
    /// An empty result is not an error: nobody answered in time.
    pub async fn multicast_request(
        &self,
        destination: impl Into<String>,
        body_type: impl Into<String>,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<Vec<BusMessage>, BusError> {
        let request = envelope::request(destination, self.reply_address.as_str(), body_type, body);
        let correlation_id = request.id;
        let destination = request.destination.clone();

        self.correlator
            .register(correlation_id, deadline_after(timeout))?;

        if let Err(e) = self.publisher.publish(request).await {
            self.correlator.retire(correlation_id);
            warn!(%correlation_id, %destination, error = %e, "multicast request publish failed");
            return Err(e.into());
        }

        let responses = self.correlator.await_responses(correlation_id, timeout).await;
        info!(
            %correlation_id,
            %destination,
            responses = responses.len(),
            timeout_ms = timeout.as_millis() as u64,
            "multicast request finished"
        );
        Ok(responses)
    }

    /// [`Bus::multicast_request`] with the configured default timeout.
    pub async fn multicast_request_default(
        &self,
        destination: impl Into<String>,
        body_type: impl Into<String>,
        body: serde_json::Value,
    ) -> Result<Vec<BusMessage>, BusError> {
        self.multicast_request(destination, body_type, body, self.default_timeout)
            .await
    }

    pub fn reply_address(&self) -> &str {
        &self.reply_address
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn correlator(&self) -> &Arc<ResponseCorrelator> {
        &self.correlator
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("reply_address", &self.reply_address)
            .field("default_timeout", &self.default_timeout)
            .field("correlator", &self.correlator)
            .finish()
    }
}
