//! In-process transport: named queues plus topics with subscriptions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cirrus_core::transport::Publisher;
use cirrus_types::config::ReceiverConfig;
use cirrus_types::error::TransportError;
use cirrus_types::message::BusMessage;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tracing::{debug, info};

use super::queue::MessageQueue;
use super::receiver::InMemoryReceiver;

/// Default delivery attempts before a message is dead-lettered.
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Queue name backing `subscription` on `topic`.
pub fn subscription_path(topic: &str, subscription: &str) -> String {
    format!("{topic}/subscriptions/{subscription}")
}

struct Inner {
    queues: DashMap<String, Arc<MessageQueue>>,
    /// topic name -> subscription queue names
    topics: DashMap<String, Vec<String>>,
    max_delivery_attempts: u32,
    closed: AtomicBool,
}

/// Transport that keeps every queue in process memory.
///
/// Cheap to clone; clones share the same queues. Publishing to a topic
/// copies the message into each of its subscriptions, publishing to a queue
/// enqueues it once.
#[derive(Clone)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

impl InMemoryTransport {
    pub fn new(max_delivery_attempts: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: DashMap::new(),
                topics: DashMap::new(),
                max_delivery_attempts,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_config(config: &ReceiverConfig) -> Self {
        Self::new(config.max_delivery_attempts)
    }

    /// Create a queue if it does not exist yet.
    pub fn create_queue(&self, name: impl Into<String>) -> &Self {
        let name = name.into();
        self.ensure_queue(&name);
        self
    }

    /// Subscribe to `topic`, returning the subscription's queue name.
    ///
    /// Subscribing twice with the same name is a no-op.
    pub fn subscribe(&self, topic: &str, subscription: &str) -> String {
        let path = subscription_path(topic, subscription);
        self.ensure_queue(&path);

        let mut subscriptions = self.inner.topics.entry(topic.to_string()).or_default();
        if !subscriptions.contains(&path) {
            subscriptions.push(path.clone());
            debug!(%topic, %subscription, "added topic subscription");
        }
        path
    }

    /// A receiver over `queue` running `concurrency` workers.
    pub fn receiver(
        &self,
        queue: &str,
        concurrency: usize,
    ) -> Result<InMemoryReceiver, TransportError> {
        let queue = self.queue(queue)?;
        Ok(InMemoryReceiver::new(queue, concurrency))
    }

    /// Close every queue. Later publishes fail with `TransportError::Closed`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        for queue in self.inner.queues.iter() {
            queue.close();
        }
        info!("in-memory transport closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn completed(&self, queue: &str) -> Result<Vec<BusMessage>, TransportError> {
        Ok(self.queue(queue)?.completed())
    }

    pub fn dead_letters(&self, queue: &str) -> Result<Vec<BusMessage>, TransportError> {
        Ok(self.queue(queue)?.dead_letters())
    }

    /// Messages waiting to be received (excludes in-flight ones).
    pub fn depth(&self, queue: &str) -> Result<usize, TransportError> {
        Ok(self.queue(queue)?.depth())
    }

    fn queue(&self, name: &str) -> Result<Arc<MessageQueue>, TransportError> {
        self.inner
            .queues
            .get(name)
            .map(|q| Arc::clone(q.value()))
            .ok_or_else(|| TransportError::UnknownDestination(name.to_string()))
    }

    fn ensure_queue(&self, name: &str) {
        let max_attempts = self.inner.max_delivery_attempts;
        self.inner
            .queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MessageQueue::new(name, max_attempts)));
    }

    fn route(&self, message: BusMessage) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let subscriptions = self
            .inner
            .topics
            .get(&message.destination)
            .map(|subs| subs.value().clone());

        if let Some(subscriptions) = subscriptions {
            if subscriptions.is_empty() {
                debug!(topic = %message.destination, "topic has no subscriptions, dropping message");
            }
            for path in subscriptions {
                self.queue(&path)?.enqueue(message.clone())?;
            }
            return Ok(());
        }

        self.queue(&message.destination)?.enqueue(message)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DELIVERY_ATTEMPTS)
    }
}

impl Publisher for InMemoryTransport {
    fn publish(&self, message: BusMessage) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move { self.route(message) })
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("queues", &self.inner.queues.len())
            .field("topics", &self.inner.topics.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
