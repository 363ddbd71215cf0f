//! Receive-and-dispatch core of the Cirrus application bus.
//!
//! This crate defines the transport "ports" (`Receiver`, `Settlement`,
//! `Publisher`) that transports implement, and the logic that sits on top of
//! them:
//! - `pump` -- `MessagePump`, the start/stop lifecycle and per-message
//!   complete/abandon protocol
//! - `dispatch` -- handler routing with interception hooks and reply forwarding
//! - `correlator` -- `ResponseCorrelator` for time-boxed multicast replies
//! - `bus` -- the `Bus` façade that issues multicast requests
//!
//! It depends only on `cirrus-types` -- never on `cirrus-infra` or any
//! concrete transport.

pub mod bus;
pub mod clock;
pub mod correlator;
pub mod diagnostics;
pub mod dispatch;
pub mod envelope;
pub mod pump;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use bus::Bus;
pub use clock::{Clock, SystemClock};
pub use correlator::ResponseCorrelator;
pub use dispatch::{Dispatcher, DispatchError, HandlerDispatcher};
pub use pump::{MessagePump, PumpState};
pub use transport::{Delivery, MessageCallback, Publisher, Receiver, Settlement};
