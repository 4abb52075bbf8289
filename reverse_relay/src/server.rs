//! Relay HTTP server.
//!
//! Provides an Axum router exposing the four relay exchanges:
//!
//! | Endpoint    | Method | Purpose                                     |
//! |-------------|--------|---------------------------------------------|
//! | `/register` | POST   | Worker joins the relay and gets a session   |
//! | `/poll`     | GET    | Worker long-polls for the next queued call  |
//! | `/response` | POST   | Worker delivers the result of a call        |
//! | `/message`  | POST   | Caller submits a call and waits for result  |

mod handlers;
mod state;

pub use handlers::{MESSAGE_PATH, POLL_PATH, REGISTER_PATH, RESPONSE_PATH, router};
pub use state::RelayServerState;

use alloc::sync::Arc;
use core::time::Duration;

use crate::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_MAX_BODY_SIZE, DEFAULT_POLL_TIMEOUT_SECS,
    registry::RoutingPolicy,
};

/// Builder for creating a relay server.
#[derive(Debug, Clone, Copy)]
pub struct RelayServerBuilder {
    routing: RoutingPolicy,
    poll_timeout: Duration,
    call_timeout: Duration,
    max_body_size: usize,
}

impl RelayServerBuilder {
    /// Create a new server builder with default timeouts.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            routing: RoutingPolicy::OldestSession,
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Set how untargeted calls pick a session.
    #[must_use]
    pub const fn routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }

    /// Set the long-poll timeout.
    #[must_use]
    pub const fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set how long callers wait for a worker's response.
    #[must_use]
    pub const fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the maximum request body size.
    #[must_use]
    pub const fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Build the server state.
    #[must_use]
    pub fn build(self) -> Arc<RelayServerState> {
        Arc::new(RelayServerState::new(
            self.routing,
            self.poll_timeout,
            self.call_timeout,
            self.max_body_size,
        ))
    }

    /// Build and create the Axum router.
    pub fn into_router(self) -> axum::Router {
        router(self.build())
    }
}

impl Default for RelayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let state = RelayServerBuilder::default().build();
        assert_eq!(state.poll_timeout(), Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS));
        assert_eq!(state.call_timeout(), Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS));
        assert_eq!(state.max_body_size(), DEFAULT_MAX_BODY_SIZE);
        assert_eq!(state.relay().registry().routing(), RoutingPolicy::OldestSession);
    }

    #[test]
    fn builder_overrides() {
        let state = RelayServerBuilder::new()
            .routing(RoutingPolicy::RequireTarget)
            .poll_timeout(Duration::from_millis(250))
            .call_timeout(Duration::from_secs(2))
            .max_body_size(64)
            .build();

        assert_eq!(state.poll_timeout(), Duration::from_millis(250));
        assert_eq!(state.call_timeout(), Duration::from_secs(2));
        assert_eq!(state.max_body_size(), 64);
        assert_eq!(state.relay().registry().routing(), RoutingPolicy::RequireTarget);
    }
}
