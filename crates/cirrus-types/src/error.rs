use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a transport (receiver, publisher, or settlement).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("lock lost for message {0} (already settled or lease expired)")]
    LockLost(Uuid),

    #[error("unknown destination '{0}'")]
    UnknownDestination(String),

    #[error("receiver for '{0}' is already started")]
    AlreadyStarted(String),

    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Errors related to message pump lifecycle.
#[derive(Debug, Error)]
pub enum PumpError {
    #[error(
        "message pump is already running or was previously running and has not finished shutting down"
    )]
    AlreadyRunning,

    #[error("receiver error: {0}")]
    Receiver(#[from] TransportError),
}

/// Errors from the multicast response correlator.
#[derive(Debug, Error)]
pub enum CorrelatorError {
    #[error("correlation id {0} is already registered")]
    DuplicateCorrelationId(Uuid),
}

/// Errors surfaced by the bus façade.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("correlation error: {0}")]
    Correlator(#[from] CorrelatorError),
}
