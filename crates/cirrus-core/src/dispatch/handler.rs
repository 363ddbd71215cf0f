//! Message handler trait and its type-erased wrapper.
//!
//! Follows the blanket-impl pattern used for other async traits here:
//! 1. `MessageHandler` uses RPITIT for the handler body
//! 2. `MessageHandlerDyn` is the object-safe twin with boxed futures,
//!    blanket-implemented for every `MessageHandler`
//! 3. `BoxMessageHandler` wraps `Box<dyn MessageHandlerDyn>` so handlers of
//!    different concrete types can share one registry

use std::future::Future;
use std::pin::Pin;

use cirrus_types::message::BusMessage;

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    /// The message was consumed; nothing to send back.
    Done,
    /// Send this body back to the message's `reply_to`.
    Reply {
        body_type: String,
        body: serde_json::Value,
    },
}

impl Handled {
    pub fn reply(body_type: impl Into<String>, body: serde_json::Value) -> Self {
        Self::Reply {
            body_type: body_type.into(),
            body,
        }
    }
}

/// Application logic for one body type.
///
/// Returning `Err` fails the dispatch, which abandons the message for
/// redelivery.
pub trait MessageHandler: Send + Sync {
    /// Name used in logs and failure annotations.
    fn name(&self) -> &str;

    fn handle(
        &self,
        message: &BusMessage,
    ) -> impl Future<Output = anyhow::Result<Handled>> + Send;
}

/// Object-safe version of [`MessageHandler`] with boxed futures.
pub trait MessageHandlerDyn: Send + Sync {
    fn name(&self) -> &str;

    fn handle_boxed<'a>(
        &'a self,
        message: &'a BusMessage,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Handled>> + Send + 'a>>;
}

impl<T: MessageHandler> MessageHandlerDyn for T {
    fn name(&self) -> &str {
        MessageHandler::name(self)
    }

    fn handle_boxed<'a>(
        &'a self,
        message: &'a BusMessage,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Handled>> + Send + 'a>> {
        Box::pin(self.handle(message))
    }
}

/// Type-erased message handler.
pub struct BoxMessageHandler {
    inner: Box<dyn MessageHandlerDyn>,
}

impl BoxMessageHandler {
    pub fn new<T: MessageHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn handle(&self, message: &BusMessage) -> anyhow::Result<Handled> {
        self.inner.handle_boxed(message).await
    }
}

impl std::fmt::Debug for BoxMessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxMessageHandler")
            .field("name", &self.name())
            .finish()
    }
}

/// Handler built from a closure over an owned copy of the message.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

/// Wrap an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(BusMessage) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Handled>> + Send,
{
    FnHandler {
        name: name.into(),
        f,
    }
}

impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(BusMessage) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Handled>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(
        &self,
        message: &BusMessage,
    ) -> impl Future<Output = anyhow::Result<Handled>> + Send {
        (self.f)(message.clone())
    }
}
