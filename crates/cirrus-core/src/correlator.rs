//! Multicast response correlation.
//!
//! A multicast request is broadcast to an unknown number of responders, so
//! replies are collected for a fixed window rather than until some expected
//! count arrives. `ResponseCorrelator` tracks each in-flight request by
//! correlation id:
//! - `register` opens the window with an absolute deadline
//! - `add_response` appends replies that arrive before the deadline
//! - `await_responses` sleeps out the window, then retires the id and
//!   returns what was collected, in arrival order
//!
//! Replies for unknown, expired, or retired ids are dropped with a debug log.
//! Slow and duplicate responders are normal under at-least-once delivery.

use std::time::Duration;

use cirrus_types::error::CorrelatorError;
use cirrus_types::message::BusMessage;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// One in-flight multicast request.
#[derive(Debug)]
struct PendingRequest {
    deadline: Instant,
    responses: Vec<BusMessage>,
}

/// Stand-in for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, saturating to a far-future instant on overflow.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Returned by [`ResponseCorrelator::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingHandle {
    pub correlation_id: Uuid,
    pub deadline: Instant,
}

/// Table of in-flight multicast requests, keyed by correlation id.
///
/// Shared (via `Arc`) by the issuing side (`Bus`) and the receiving side
/// (`HandlerDispatcher`). `DashMap` locks per shard, so appending a reply
/// never waits on a caller sleeping in `await_responses`.
#[derive(Default)]
pub struct ResponseCorrelator {
    pending: DashMap<Uuid, PendingRequest>,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting replies for `correlation_id` until `deadline`.
    pub fn register(
        &self,
        correlation_id: Uuid,
        deadline: Instant,
    ) -> Result<PendingHandle, CorrelatorError> {
        match self.pending.entry(correlation_id) {
            Entry::Occupied(_) => Err(CorrelatorError::DuplicateCorrelationId(correlation_id)),
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest {
                    deadline,
                    responses: Vec::new(),
                });
                debug!(%correlation_id, "registered multicast request");
                Ok(PendingHandle {
                    correlation_id,
                    deadline,
                })
            }
        }
    }

    /// Record a reply.
    ///
    /// Returns `true` if the reply was accepted. Replies for an unknown or
    /// retired id, or arriving at or after the deadline, are dropped.
    pub fn add_response(&self, correlation_id: Uuid, response: BusMessage) -> bool {
        let Some(mut pending) = self.pending.get_mut(&correlation_id) else {
            debug!(
                %correlation_id,
                message_id = %response.id,
                "no pending multicast request for reply (unknown or already retired), dropping"
            );
            return false;
        };

        if Instant::now() >= pending.deadline {
            debug!(
                %correlation_id,
                message_id = %response.id,
                "reply arrived after multicast deadline, dropping"
            );
            return false;
        }

        pending.responses.push(response);
        debug!(
            %correlation_id,
            received = pending.responses.len(),
            "recorded multicast reply"
        );
        true
    }

    /// Wait out the collection window and return the replies.
    ///
    /// The window ends at `now + timeout` or at the registered deadline,
    /// whichever comes first. The id is retired on return (or if this future
    /// is dropped), so later replies are dropped. An unregistered id yields
    /// an empty vector once the timeout elapses.
    pub async fn await_responses(&self, correlation_id: Uuid, timeout: Duration) -> Vec<BusMessage> {
        let requested = deadline_after(timeout);
        let deadline = self
            .pending
            .get(&correlation_id)
            .map_or(requested, |pending| pending.deadline.min(requested));

        let mut guard = RetireOnDrop {
            correlator: self,
            correlation_id,
            armed: true,
        };
        tokio::time::sleep_until(deadline).await;
        guard.armed = false;

        let responses = self.retire(correlation_id).unwrap_or_default();
        debug!(
            %correlation_id,
            received = responses.len(),
            "multicast collection window closed"
        );
        responses
    }

    /// Stop collecting for `correlation_id`, returning the replies so far.
    pub fn retire(&self, correlation_id: Uuid) -> Option<Vec<BusMessage>> {
        self.pending
            .remove(&correlation_id)
            .map(|(_, pending)| pending.responses)
    }

    pub fn is_pending(&self, correlation_id: &Uuid) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Retires a correlation id if `await_responses` is cancelled mid-window.
struct RetireOnDrop<'a> {
    correlator: &'a ResponseCorrelator,
    correlation_id: Uuid,
    armed: bool,
}

impl Drop for RetireOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed && self.correlator.retire(self.correlation_id).is_some() {
            debug!(
                correlation_id = %self.correlation_id,
                "multicast wait cancelled, retired correlation id"
            );
        }
    }
}

impl std::fmt::Debug for ResponseCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCorrelator")
            .field("pending_requests", &self.pending.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
