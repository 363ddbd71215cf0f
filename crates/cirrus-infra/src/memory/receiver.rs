//! `Receiver` over one in-memory queue.

use std::sync::{Arc, Mutex};

use cirrus_core::transport::{Delivery, MessageCallback, Receiver, Settlement};
use cirrus_types::error::TransportError;
use cirrus_types::message::MessageProperties;
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::queue::MessageQueue;

/// Lock held by one delivery until it is completed or abandoned.
///
/// Holds the queue itself, so settling still works after the receiver that
/// produced the delivery has stopped.
struct QueueSettlement {
    queue: Arc<MessageQueue>,
    lock_token: Uuid,
    message_id: Uuid,
}

impl Settlement for QueueSettlement {
    fn complete(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>> {
        Box::pin(async move { self.queue.complete(self.lock_token, self.message_id) })
    }

    fn abandon(
        self: Box<Self>,
        properties: MessageProperties,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        Box::pin(async move {
            self.queue
                .abandon(self.lock_token, self.message_id, properties)
        })
    }
}

struct Workers {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Pulls from one queue with a fixed number of worker tasks.
pub struct InMemoryReceiver {
    queue: Arc<MessageQueue>,
    concurrency: usize,
    workers: Mutex<Option<Workers>>,
}

impl InMemoryReceiver {
    pub(crate) fn new(queue: Arc<MessageQueue>, concurrency: usize) -> Self {
        Self {
            queue,
            concurrency: concurrency.max(1),
            workers: Mutex::new(None),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn is_started(&self) -> bool {
        self.workers
            .lock()
            .expect("receiver workers lock poisoned")
            .is_some()
    }
}

async fn run_worker(
    queue: Arc<MessageQueue>,
    callback: MessageCallback,
    cancel: CancellationToken,
    worker: usize,
) {
    debug!(queue = queue.name(), worker, "receive worker started");
    while let Some(locked) = queue.receive(&cancel).await {
        let settlement = QueueSettlement {
            queue: Arc::clone(&queue),
            lock_token: locked.lock_token,
            message_id: locked.message.id,
        };
        // Runs to completion even if cancellation fires meanwhile.
        callback(Delivery::new(locked.message, settlement)).await;
    }
    debug!(queue = queue.name(), worker, "receive worker exited");
}

impl Receiver for InMemoryReceiver {
    fn name(&self) -> &str {
        self.queue.name()
    }

    async fn start(&self, callback: MessageCallback) -> Result<(), TransportError> {
        let mut workers = self.workers.lock().expect("receiver workers lock poisoned");
        if workers.is_some() {
            return Err(TransportError::AlreadyStarted(self.name().to_string()));
        }
        if self.queue.is_closed() {
            return Err(TransportError::Closed);
        }

        let cancel = CancellationToken::new();
        let handles = (0..self.concurrency)
            .map(|worker| {
                tokio::spawn(run_worker(
                    Arc::clone(&self.queue),
                    Arc::clone(&callback),
                    cancel.clone(),
                    worker,
                ))
            })
            .collect();

        *workers = Some(Workers { cancel, handles });
        info!(queue = self.name(), concurrency = self.concurrency, "receiver started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let Some(Workers { cancel, handles }) = self
            .workers
            .lock()
            .expect("receiver workers lock poisoned")
            .take()
        else {
            return Ok(());
        };

        cancel.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(queue = self.name(), error = %e, "receive worker ended abnormally");
            }
        }
        info!(queue = self.name(), "receiver stopped");
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryReceiver")
            .field("queue", &self.queue.name())
            .field("concurrency", &self.concurrency)
            .field("started", &self.is_started())
            .finish()
    }
}
