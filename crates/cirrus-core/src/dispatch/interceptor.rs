//! Inbound interception hooks.
//!
//! An `InboundInterceptor` observes each handler invocation. Every hook has a
//! no-op default, so an interceptor implements only the capabilities it
//! needs. Interceptors are ordered by [`InboundInterceptor::priority`]
//! (higher first, ties in registration order): `executing` hooks run in that
//! order, `success` and `error` hooks in reverse.

use cirrus_types::message::BusMessage;
use futures_util::future::BoxFuture;

pub trait InboundInterceptor: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    /// Runs before the handler. An `Err` prevents the handler from running
    /// and fails the dispatch.
    fn on_handler_executing<'a>(
        &'a self,
        _handler: &'a str,
        _message: &'a BusMessage,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Runs after the handler (and any reply publish) succeeded. An `Err`
    /// fails the dispatch.
    fn on_handler_success<'a>(
        &'a self,
        _handler: &'a str,
        _message: &'a BusMessage,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Runs after the handler, the reply publish, or another interceptor
    /// failed. Errors returned here are logged; the original failure is what
    /// the dispatch reports.
    fn on_handler_error<'a>(
        &'a self,
        _handler: &'a str,
        _message: &'a BusMessage,
        _error: &'a (dyn std::error::Error + Send + Sync + 'static),
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
