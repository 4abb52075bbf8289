//! Error types for the relay and its worker client.

use alloc::{boxed::Box, string::String};

use thiserror::Error;

use crate::id::SessionId;

/// Boxed transport error from an [`HttpClient`](crate::http_client::HttpClient).
pub type TransportError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// The session id was never registered with this relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session not found: {0}")]
pub struct SessionNotFound(pub SessionId);

/// Problem while submitting a call and waiting for its result.
#[derive(Debug, Error)]
pub enum CallError {
    /// No worker answered within the wait budget.
    #[error("timed out waiting for a worker response")]
    Timeout,

    /// No session is registered to serve the call.
    #[error("no workers available")]
    NoWorkers,

    /// The targeted session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The routing policy requires an explicit target and none was given.
    #[error("call must name a target session")]
    MissingTarget,

    /// The completion cell was dropped without being fulfilled.
    #[error("response dropped before delivery")]
    ResponseDropped,

    /// The request to the relay could not be completed.
    #[cfg(feature = "client")]
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// The relay answered with a status this client does not understand.
    #[cfg(feature = "client")]
    #[error("relay returned status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Error message from the relay.
        message: String,
    },

    /// The relay rejected the call payload.
    #[cfg(feature = "client")]
    #[error("relay rejected the call: {0}")]
    Rejected(String),

    /// The result body was not valid JSON.
    #[cfg(feature = "client")]
    #[error("JSON decoding error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<SessionNotFound> for CallError {
    fn from(SessionNotFound(id): SessionNotFound) -> Self {
        Self::SessionNotFound(id)
    }
}

/// Problem while starting a worker client.
///
/// Registration failures are fatal: the poll loop is never entered.
#[cfg(feature = "client")]
#[derive(Debug, Error)]
pub enum StartError {
    /// The registration request could not be completed.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// A relay URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The relay answered registration with an error status.
    #[error("relay error: {status} - {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from the relay.
        message: String,
    },

    /// The registration response was not valid JSON.
    #[error("JSON decoding error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The registration response has no session id.
    #[error("missing session ID in response")]
    MissingSessionId,

    /// The session id in the registration response is malformed.
    #[error("invalid session ID format")]
    InvalidSessionId,
}

/// Problem reported by a [`CallHandler`](crate::client::CallHandler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("call handler failed: {message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors while processing a relay HTTP request.
#[cfg(feature = "server")]
#[derive(Debug, Error)]
pub enum ServerError {
    /// The `session_id` query parameter is missing.
    #[error("missing session_id")]
    MissingSessionId,

    /// No session found for the given id.
    #[error("session not found")]
    SessionNotFound,

    /// The request body is not the expected JSON.
    #[error("invalid request: {0}")]
    InvalidBody(String),

    /// The submitted call could not be completed.
    #[error(transparent)]
    Call(#[from] CallError),
}

#[cfg(feature = "server")]
impl From<SessionNotFound> for ServerError {
    fn from(_: SessionNotFound) -> Self {
        Self::SessionNotFound
    }
}
