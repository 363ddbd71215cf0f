use cirrus_types::error::TransportError;
use thiserror::Error;

/// Why a message could not be dispatched.
///
/// Any `Err` from `Dispatcher::dispatch` makes the pump abandon the message.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler registered for body type '{0}'")]
    NoHandler(String),

    #[error("handler '{handler}' failed: {source}")]
    Handler {
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("interceptor '{interceptor}' failed around handler '{handler}': {source}")]
    Interceptor {
        interceptor: String,
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("handler '{handler}' could not publish its reply: {source}")]
    ReplyPublish {
        handler: String,
        #[source]
        source: TransportError,
    },

    #[error("{} handlers failed", .0.len())]
    Multiple(Vec<DispatchError>),

    #[error("dispatch panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    /// Stable classification written into abandon annotations.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoHandler(_) => "no_handler",
            Self::Handler { .. } => "handler",
            Self::Interceptor { .. } => "interceptor",
            Self::ReplyPublish { .. } => "reply_publish",
            Self::Multiple(_) => "multiple",
            Self::Panicked(_) => "panic",
        }
    }

    /// The error that best explains the failure: the first of several, or
    /// `self` for a single failure.
    pub fn primary(&self) -> &DispatchError {
        match self {
            Self::Multiple(errors) => errors.first().map_or(self, DispatchError::primary),
            other => other,
        }
    }
}
