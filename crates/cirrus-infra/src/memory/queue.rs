//! A single in-process queue with peek-lock semantics.
//!
//! Received messages move to an in-flight table keyed by a per-receive lock
//! token. Completing or abandoning releases the lock; settling with a token
//! that is no longer held fails with `TransportError::LockLost`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use cirrus_core::diagnostics::FAILURE_PREFIX;
use cirrus_types::error::TransportError;
use cirrus_types::message::{BusMessage, MessageProperties};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<BusMessage>,
    in_flight: HashMap<Uuid, BusMessage>,
    completed: Vec<BusMessage>,
    dead_letters: Vec<BusMessage>,
    closed: bool,
}

/// One queue (or one topic subscription).
#[derive(Debug)]
pub(crate) struct MessageQueue {
    name: String,
    max_delivery_attempts: u32,
    state: Mutex<QueueState>,
    available: Notify,
}

/// A message checked out of the queue under a lock token.
#[derive(Debug)]
pub(crate) struct Locked {
    pub lock_token: Uuid,
    pub message: BusMessage,
}

impl MessageQueue {
    pub fn new(name: impl Into<String>, max_delivery_attempts: u32) -> Self {
        Self {
            name: name.into(),
            max_delivery_attempts,
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enqueue(&self, message: BusMessage) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().expect("queue state lock poisoned");
            if state.closed {
                return Err(TransportError::Closed);
            }
            debug!(queue = %self.name, message_id = %message.id, "enqueued message");
            state.ready.push_back(message);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Take the next ready message, waiting until one arrives.
    ///
    /// Returns `None` once `cancel` fires or the queue is closed.
    pub async fn receive(&self, cancel: &CancellationToken) -> Option<Locked> {
        loop {
            // Register interest before checking, so an enqueue or close that
            // lands between the check and the wait still wakes us.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().expect("queue state lock poisoned");
                if let Some(message) = state.ready.pop_front() {
                    let lock_token = Uuid::now_v7();
                    state.in_flight.insert(lock_token, message.clone());
                    return Some(Locked {
                        lock_token,
                        message,
                    });
                }
                if state.closed {
                    return None;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    pub fn complete(&self, lock_token: Uuid, message_id: Uuid) -> Result<(), TransportError> {
        let mut state = self.state.lock().expect("queue state lock poisoned");
        let message = state
            .in_flight
            .remove(&lock_token)
            .ok_or(TransportError::LockLost(message_id))?;
        debug!(queue = %self.name, %message_id, "completed message");
        state.completed.push(message);
        Ok(())
    }

    /// Release the lock and either requeue the message or dead-letter it.
    pub fn abandon(
        &self,
        lock_token: Uuid,
        message_id: Uuid,
        properties: MessageProperties,
    ) -> Result<(), TransportError> {
        let requeued = {
            let mut state = self.state.lock().expect("queue state lock poisoned");
            let mut message = state
                .in_flight
                .remove(&lock_token)
                .ok_or(TransportError::LockLost(message_id))?;
            if properties.keys().any(|k| k.starts_with(FAILURE_PREFIX)) {
                message
                    .properties
                    .retain(|k, _| !k.starts_with(FAILURE_PREFIX));
            }
            message.properties.extend(properties);

            if message.delivery_count >= self.max_delivery_attempts {
                warn!(
                    queue = %self.name,
                    %message_id,
                    delivery_count = message.delivery_count,
                    "max delivery attempts reached, dead-lettering message"
                );
                state.dead_letters.push(message);
                false
            } else {
                message.delivery_count += 1;
                debug!(
                    queue = %self.name,
                    %message_id,
                    delivery_count = message.delivery_count,
                    "abandoned message, requeued for redelivery"
                );
                state.ready.push_back(message);
                true
            }
        };

        if requeued {
            self.available.notify_one();
        }
        Ok(())
    }

    /// Refuse new messages and wake every waiting receiver.
    pub fn close(&self) {
        self.state.lock().expect("queue state lock poisoned").closed = true;
        self.available.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("queue state lock poisoned").closed
    }

    pub fn depth(&self) -> usize {
        self.state.lock().expect("queue state lock poisoned").ready.len()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().expect("queue state lock poisoned").in_flight.len()
    }

    pub fn completed(&self) -> Vec<BusMessage> {
        self.state.lock().expect("queue state lock poisoned").completed.clone()
    }

    pub fn dead_letters(&self) -> Vec<BusMessage> {
        self.state
            .lock()
            .expect("queue state lock poisoned")
            .dead_letters
            .clone()
    }
}
