//! Message pump: receive lifecycle and per-message settlement.
//!
//! A `MessagePump` connects one `Receiver` to one `Dispatcher`. For every
//! delivered message it runs the dispatcher and settles the delivery exactly
//! once: `complete` on success, `abandon` with failure annotations on error.
//! Nothing that happens while handling a single message (errors, settlement
//! failures, panics) escapes into the receive loop.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use cirrus_types::error::PumpError;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::clock::Clock;
use crate::diagnostics::failure_properties;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::transport::{Delivery, MessageCallback, Receiver};

/// Lifecycle state of a [`MessagePump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Drives messages from a `Receiver` through a `Dispatcher`.
///
/// Cloning is cheap and every clone shares the same lifecycle state.
pub struct MessagePump<R, D> {
    receiver: Arc<R>,
    dispatcher: Arc<D>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<PumpState>>,
}

impl<R, D> Clone for MessagePump<R, D> {
    fn clone(&self) -> Self {
        Self {
            receiver: Arc::clone(&self.receiver),
            dispatcher: Arc::clone(&self.dispatcher),
            clock: Arc::clone(&self.clock),
            state: Arc::clone(&self.state),
        }
    }
}

impl<R, D> MessagePump<R, D>
where
    R: Receiver + 'static,
    D: Dispatcher + 'static,
{
    pub fn new(receiver: Arc<R>, dispatcher: Arc<D>, clock: Arc<dyn Clock>) -> Self {
        Self {
            receiver,
            dispatcher,
            clock,
            state: Arc::new(Mutex::new(PumpState::Stopped)),
        }
    }

    /// Start receiving.
    ///
    /// Fails with [`PumpError::AlreadyRunning`] unless the pump is fully
    /// stopped, including while a previous `stop` is still draining.
    pub async fn start(&self) -> Result<(), PumpError> {
        {
            let mut state = self.state.lock().expect("pump state lock poisoned");
            if *state != PumpState::Stopped {
                return Err(PumpError::AlreadyRunning);
            }
            *state = PumpState::Starting;
        }

        let receiver = self.receiver.name();
        if let Err(e) = self.receiver.start(self.callback()).await {
            self.set_state(PumpState::Stopped);
            error!(receiver, error = %e, "message pump failed to start receiver");
            return Err(e.into());
        }

        let stopped_meanwhile = {
            let mut state = self.state.lock().expect("pump state lock poisoned");
            if *state == PumpState::Starting {
                *state = PumpState::Running;
                false
            } else {
                true
            }
        };

        if stopped_meanwhile {
            // `stop` ran before the receiver finished starting; honor it.
            warn!(receiver, "message pump stopped while starting, stopping receiver");
            if let Err(e) = self.receiver.stop().await {
                warn!(receiver, error = %e, "failed to stop receiver after interrupted start");
            }
            return Ok(());
        }

        info!(receiver, "message pump started");
        Ok(())
    }

    /// Stop receiving. A no-op if the pump is already stopped or stopping.
    ///
    /// The pump ends up `Stopped` even when the receiver reports an error;
    /// that error is returned.
    pub async fn stop(&self) -> Result<(), PumpError> {
        {
            let mut state = self.state.lock().expect("pump state lock poisoned");
            match *state {
                PumpState::Stopped | PumpState::Stopping => return Ok(()),
                PumpState::Starting | PumpState::Running => *state = PumpState::Stopping,
            }
        }

        let receiver = self.receiver.name();
        debug!(receiver, "message pump stopping");
        let result = self.receiver.stop().await;
        self.set_state(PumpState::Stopped);

        match result {
            Ok(()) => {
                info!(receiver, "message pump stopped");
                Ok(())
            }
            Err(e) => {
                error!(receiver, error = %e, "receiver failed to stop cleanly");
                Err(e.into())
            }
        }
    }

    /// Best-effort stop that does not wait for shutdown to finish.
    ///
    /// Await [`MessagePump::stop`] when shutdown must be observed.
    pub fn dispose(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                receiver = self.receiver.name(),
                "no tokio runtime available, message pump not stopped on dispose"
            );
            return;
        };

        let pump = self.clone();
        handle.spawn(async move {
            if let Err(e) = pump.stop().await {
                warn!(error = %e, "message pump stop during dispose failed");
            }
        });
    }

    pub fn state(&self) -> PumpState {
        *self.state.lock().expect("pump state lock poisoned")
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), PumpState::Starting | PumpState::Running)
    }

    fn set_state(&self, next: PumpState) {
        *self.state.lock().expect("pump state lock poisoned") = next;
    }

    fn callback(&self) -> MessageCallback {
        let dispatcher = Arc::clone(&self.dispatcher);
        let clock = Arc::clone(&self.clock);
        Arc::new(move |delivery: Delivery| -> BoxFuture<'static, ()> {
            let dispatcher = Arc::clone(&dispatcher);
            let clock = Arc::clone(&clock);
            let message = delivery.message();
            let span = info_span!(
                "dispatch",
                message_id = %message.id,
                body_type = %message.body_type,
                delivery_count = message.delivery_count
            );
            let message_id = message.id;

            let guarded = async move {
                let outcome = AssertUnwindSafe(dispatch_delivery(
                    dispatcher.as_ref(),
                    clock.as_ref(),
                    delivery,
                ))
                .catch_unwind()
                .await;

                if let Err(panic) = outcome {
                    error!(
                        %message_id,
                        panic = panic_message(&*panic),
                        "unhandled panic in message pump"
                    );
                }
            };
            Box::pin(guarded.instrument(span))
        })
    }
}

/// Dispatch one delivery and settle it.
async fn dispatch_delivery<D: Dispatcher>(dispatcher: &D, clock: &dyn Clock, delivery: Delivery) {
    let message = delivery.message();
    let message_id = message.id;
    let correlation_id = message.correlation_id;
    let body_type = message.body_type.clone();
    let reply_to = message.reply_to_or_default().to_string();

    info!(%message_id, ?correlation_id, %body_type, %reply_to, "dispatching message");

    // Handler panics are abandoned like any other dispatch failure.
    let dispatched = match AssertUnwindSafe(dispatcher.dispatch(message))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(DispatchError::Panicked(panic_message(&*panic).to_string())),
    };

    match dispatched {
        Ok(()) => {
            debug!(%message_id, %body_type, "dispatched message, completing");
            match delivery.complete().await {
                Ok(()) => info!(%message_id, %body_type, "completed message"),
                Err(e) => error!(
                    %message_id,
                    %body_type,
                    error = %e,
                    "could not complete message, possible lock expiry"
                ),
            }
        }
        Err(e) => {
            error!(
                %message_id,
                ?correlation_id,
                %reply_to,
                %body_type,
                kind = e.kind(),
                error = %e,
                "message dispatch failed"
            );
            let properties = failure_properties(&e, clock.now());
            if let Err(abandon_err) = delivery.abandon(properties).await {
                error!(
                    %message_id,
                    %body_type,
                    error = %abandon_err,
                    "could not abandon message, possible lock expiry"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl<R: Receiver, D> std::fmt::Debug for MessagePump<R, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().map(|s| *s).ok();
        f.debug_struct("MessagePump")
            .field("receiver", &self.receiver.name())
            .field("state", &state)
            .finish()
    }
}
