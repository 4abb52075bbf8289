//! Server state shared by all request handlers.

use core::time::Duration;

use crate::{registry::RoutingPolicy, relay::Relay};

/// Server-side state for the relay's HTTP surface.
#[derive(Debug)]
pub struct RelayServerState {
    /// The matching engine and its session registry.
    pub(crate) relay: Relay,

    /// How long a poll waits for work before answering "no work".
    pub(crate) poll_timeout: Duration,

    /// How long a caller waits for a worker's response.
    pub(crate) call_timeout: Duration,

    /// Maximum accepted request body size.
    pub(crate) max_body_size: usize,
}

impl RelayServerState {
    /// Create a new server state with an empty registry.
    #[must_use]
    pub fn new(
        routing: RoutingPolicy,
        poll_timeout: Duration,
        call_timeout: Duration,
        max_body_size: usize,
    ) -> Self {
        Self {
            relay: Relay::new(routing),
            poll_timeout,
            call_timeout,
            max_body_size,
        }
    }

    /// The matching engine.
    #[must_use]
    pub const fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Get the poll timeout.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Get the call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Get the maximum request body size.
    #[must_use]
    pub const fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}
