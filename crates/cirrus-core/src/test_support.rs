//! In-crate fakes for the transport ports.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cirrus_types::error::TransportError;
use cirrus_types::message::{BusMessage, MessageProperties};
use futures_util::future::BoxFuture;
use uuid::Uuid;

use crate::transport::{Delivery, MessageCallback, Publisher, Receiver, Settlement};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Completed(Uuid),
    Abandoned(Uuid, MessageProperties),
}

/// Shared record of every settlement attempt.
#[derive(Debug, Clone, Default)]
pub struct SettlementLog {
    outcomes: Arc<Mutex<Vec<Settled>>>,
    attempts: Arc<AtomicUsize>,
}

impl SettlementLog {
    pub fn outcomes(&self) -> Vec<Settled> {
        self.outcomes.lock().unwrap().clone()
    }

    /// Settlement calls made, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// Settlement that records into a [`SettlementLog`] and can be told to fail.
pub struct RecordingSettlement {
    message_id: Uuid,
    log: SettlementLog,
    fail_complete: bool,
    fail_abandon: bool,
}

impl RecordingSettlement {
    pub fn new() -> (Self, SettlementLog) {
        let log = SettlementLog::default();
        (Self::with_log(&log), log)
    }

    pub fn with_log(log: &SettlementLog) -> Self {
        Self {
            message_id: Uuid::nil(),
            log: log.clone(),
            fail_complete: false,
            fail_abandon: false,
        }
    }

    pub fn failing_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    pub fn failing_abandon(mut self) -> Self {
        self.fail_abandon = true;
        self
    }

    /// Build a delivery whose settlement is recorded under the message id.
    pub fn deliver(mut self, message: BusMessage) -> Delivery {
        self.message_id = message.id;
        Delivery::new(message, self)
    }
}

impl Settlement for RecordingSettlement {
    fn complete(self: Box<Self>) -> BoxFuture<'static, Result<(), TransportError>> {
        Box::pin(async move {
            self.log.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_complete {
                return Err(TransportError::LockLost(self.message_id));
            }
            self.log
                .outcomes
                .lock()
                .unwrap()
                .push(Settled::Completed(self.message_id));
            Ok(())
        })
    }

    fn abandon(
        self: Box<Self>,
        properties: MessageProperties,
    ) -> BoxFuture<'static, Result<(), TransportError>> {
        Box::pin(async move {
            self.log.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_abandon {
                return Err(TransportError::LockLost(self.message_id));
            }
            self.log
                .outcomes
                .lock()
                .unwrap()
                .push(Settled::Abandoned(self.message_id, properties));
            Ok(())
        })
    }
}

/// Publisher that keeps everything it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<BusMessage>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn sent(&self) -> Vec<BusMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, message: BusMessage) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed(message.destination));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        })
    }
}

/// Receiver driven by the test: `deliver` invokes the registered callback.
#[derive(Default)]
pub struct ManualReceiver {
    callback: Mutex<Option<MessageCallback>>,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    fail_start: AtomicBool,
}

impl ManualReceiver {
    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub async fn deliver(&self, delivery: Delivery) {
        let callback = self
            .callback
            .lock()
            .unwrap()
            .clone()
            .expect("receiver not started");
        callback(delivery).await;
    }

    pub fn is_receiving(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }
}

impl Receiver for ManualReceiver {
    fn name(&self) -> &str {
        "manual"
    }

    async fn start(&self, callback: MessageCallback) -> Result<(), TransportError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        if self.fail_start.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        *self.callback.lock().unwrap() = Some(callback);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.callback.lock().unwrap().take();
        Ok(())
    }
}
