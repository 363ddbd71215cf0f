//! Inbound message dispatch.
//!
//! - `error` -- `DispatchError`, the failure half of a dispatch result
//! - `handler` -- `MessageHandler` trait and its boxed, object-safe wrapper
//! - `interceptor` -- `InboundInterceptor` before/success/error hooks
//! - `dispatcher` -- `Dispatcher` trait and the `HandlerDispatcher` that
//!   routes by body type and forwards multicast replies to the correlator

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod interceptor;

pub use dispatcher::{Dispatcher, HandlerDispatcher};
pub use error::DispatchError;
pub use handler::{BoxMessageHandler, Handled, MessageHandler, handler_fn};
pub use interceptor::InboundInterceptor;
