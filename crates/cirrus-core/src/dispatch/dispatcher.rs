//! Routing of inbound messages to handlers.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use cirrus_types::message::BusMessage;
use futures_util::future::join_all;
use tracing::{debug, warn};

use super::error::DispatchError;
use super::handler::{BoxMessageHandler, Handled, MessageHandler};
use super::interceptor::InboundInterceptor;
use crate::correlator::ResponseCorrelator;
use crate::envelope;
use crate::transport::Publisher;

/// Resolves one message to its handler invocations.
///
/// `Ok(())` means the message may be completed; any `Err` means it should be
/// abandoned. Implementations must be safe to call concurrently.
pub trait Dispatcher: Send + Sync {
    fn dispatch(
        &self,
        message: &BusMessage,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

/// Dispatcher backed by a body-type → handlers registry.
///
/// - Replies (messages carrying a `correlation_id`) go to the
///   `ResponseCorrelator` instead of handlers.
/// - Every handler registered for the body type runs concurrently, wrapped
///   by the interceptor chain.
/// - A `Handled::Reply` is published back to the message's `reply_to`.
pub struct HandlerDispatcher {
    handlers: HashMap<String, Vec<BoxMessageHandler>>,
    interceptors: Vec<Arc<dyn InboundInterceptor>>,
    correlator: Arc<ResponseCorrelator>,
    publisher: Arc<dyn Publisher>,
}

impl HandlerDispatcher {
    pub fn new(correlator: Arc<ResponseCorrelator>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            handlers: HashMap::new(),
            interceptors: Vec::new(),
            correlator,
            publisher,
        }
    }

    /// Add a handler for `body_type`. Several handlers may share a body type.
    pub fn register_handler<H: MessageHandler + 'static>(
        &mut self,
        body_type: impl Into<String>,
        handler: H,
    ) -> &mut Self {
        let body_type = body_type.into();
        let handler = BoxMessageHandler::new(handler);
        debug!(%body_type, handler = handler.name(), "registered message handler");
        self.handlers.entry(body_type).or_default().push(handler);
        self
    }

    /// Add an interceptor, keeping the chain ordered by descending priority.
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn InboundInterceptor>) -> &mut Self {
        self.interceptors.push(interceptor);
        // Stable sort: equal priorities stay in registration order.
        self.interceptors.sort_by_key(|i| Reverse(i.priority()));
        self
    }

    pub fn handler_count(&self, body_type: &str) -> usize {
        self.handlers.get(body_type).map_or(0, Vec::len)
    }

    async fn invoke(
        &self,
        handler: &BoxMessageHandler,
        message: &BusMessage,
    ) -> Result<(), DispatchError> {
        let name = handler.name();

        for interceptor in &self.interceptors {
            if let Err(e) = interceptor.on_handler_executing(name, message).await {
                self.notify_error(name, message, &*e).await;
                return Err(DispatchError::Interceptor {
                    interceptor: interceptor.name().to_string(),
                    handler: name.to_string(),
                    source: e,
                });
            }
        }

        let outcome = match handler.handle(message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.notify_error(name, message, &*e).await;
                return Err(DispatchError::Handler {
                    handler: name.to_string(),
                    source: e,
                });
            }
        };

        if let Handled::Reply { body_type, body } = outcome {
            if let Err(e) = self.publish_reply(message, body_type, body).await {
                self.notify_error(name, message, &e).await;
                return Err(DispatchError::ReplyPublish {
                    handler: name.to_string(),
                    source: e,
                });
            }
        }

        for interceptor in self.interceptors.iter().rev() {
            if let Err(e) = interceptor.on_handler_success(name, message).await {
                self.notify_error(name, message, &*e).await;
                return Err(DispatchError::Interceptor {
                    interceptor: interceptor.name().to_string(),
                    handler: name.to_string(),
                    source: e,
                });
            }
        }

        Ok(())
    }

    async fn publish_reply(
        &self,
        original: &BusMessage,
        body_type: String,
        body: serde_json::Value,
    ) -> Result<(), cirrus_types::error::TransportError> {
        let Some(reply) = envelope::reply(original, body_type, body) else {
            warn!(
                message_id = %original.id,
                body_type = %original.body_type,
                "handler produced a reply but the message has no reply_to, discarding"
            );
            return Ok(());
        };

        debug!(
            request_id = %original.id,
            destination = %reply.destination,
            "publishing reply"
        );
        self.publisher.publish(reply).await
    }

    async fn notify_error(
        &self,
        handler: &str,
        message: &BusMessage,
        error: &(dyn std::error::Error + Send + Sync + 'static),
    ) {
        for interceptor in self.interceptors.iter().rev() {
            if let Err(hook_error) = interceptor.on_handler_error(handler, message, error).await {
                warn!(
                    interceptor = interceptor.name(),
                    handler,
                    message_id = %message.id,
                    error = %hook_error,
                    "interceptor error hook failed"
                );
            }
        }
    }
}

impl Dispatcher for HandlerDispatcher {
    async fn dispatch(&self, message: &BusMessage) -> Result<(), DispatchError> {
        if let Some(correlation_id) = message.correlation_id {
            // Late and unknown replies are dropped inside the correlator;
            // either way the reply is done with.
            self.correlator.add_response(correlation_id, message.clone());
            return Ok(());
        }

        let handlers = self
            .handlers
            .get(&message.body_type)
            .filter(|handlers| !handlers.is_empty())
            .ok_or_else(|| DispatchError::NoHandler(message.body_type.clone()))?;

        let results = join_all(handlers.iter().map(|h| self.invoke(h, message))).await;
        let mut failures: Vec<DispatchError> = results.into_iter().filter_map(Result::err).collect();

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(DispatchError::Multiple(failures)),
        }
    }
}

impl std::fmt::Debug for HandlerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDispatcher")
            .field("body_types", &self.handlers.len())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
