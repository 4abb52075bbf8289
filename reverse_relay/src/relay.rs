//! The relay's call/response matching engine.
//!
//! Callers and workers never talk to each other directly. A caller's payload
//! is queued on a worker's [`Session`] and the caller waits on a completion
//! cell; the worker picks the payload up with a poll and later posts the
//! result, which is matched back to the waiting caller by [`RequestId`].
//!
//! ```text
//!   caller                      relay                         worker
//!     │ enqueue_and_wait ──► pending ──► wait_for_work ──────►  │
//!     │                                                        │ (handler)
//!     │ ◄── completion cell ◄── in_flight ◄── deliver_response │
//! ```
//!
//! A request's life: `Queued → InFlight → {Answered | Abandoned}`. A caller
//! that stops waiting does not retract its request; whatever the worker does
//! with it later is accepted and observed by nobody.

use alloc::sync::Arc;
use core::time::Duration;

use serde_json::Value;
use tokio::{sync::oneshot, time::Instant};

use crate::{
    error::CallError,
    id::{RequestId, SessionId},
    metrics::record,
    protocol::PollResponse,
    registry::{RoutingPolicy, SessionRegistry},
    session::{Delivery, PendingRequest, Session},
};

/// A submitted call whose result has not been awaited yet.
#[derive(Debug)]
pub struct PendingCall {
    request_id: RequestId,
    session_id: SessionId,
    submitted_at: Instant,
    completion: oneshot::Receiver<Value>,
}

impl PendingCall {
    /// The id the worker will answer with.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The session the call was queued on.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Wait up to `timeout` for the worker's result.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Timeout`] if the budget elapses first. The request
    /// stays wherever it is; a late response is accepted and discarded.
    pub async fn wait(self, timeout: Duration) -> Result<Value, CallError> {
        match tokio::time::timeout(timeout, self.completion).await {
            Ok(Ok(result)) => {
                record::call_completed(self.submitted_at.elapsed());
                tracing::debug!(request_id = %self.request_id, "call completed");
                Ok(result)
            }
            Ok(Err(_)) => Err(CallError::ResponseDropped),
            Err(_elapsed) => {
                record::call_timed_out();
                tracing::info!(
                    session_id = %self.session_id,
                    request_id = %self.request_id,
                    ?timeout,
                    "call timed out; request abandoned"
                );
                Err(CallError::Timeout)
            }
        }
    }
}

/// The matching engine: a [`SessionRegistry`] plus the operations that move
/// requests through it.
#[derive(Debug, Default)]
pub struct Relay {
    registry: SessionRegistry,
}

impl Relay {
    /// Create a relay with an empty registry.
    #[must_use]
    pub fn new(routing: RoutingPolicy) -> Self {
        Self {
            registry: SessionRegistry::new(routing),
        }
    }

    /// The session registry.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Register a new worker session.
    pub async fn register(&self) -> Arc<Session> {
        let session = self.registry.create_session().await;
        record::session_registered();
        session
    }

    /// Queue a call on `session` without waiting for its result.
    pub async fn submit(&self, session: &Session, payload: Value) -> PendingCall {
        let (request, completion) = PendingRequest::new(payload);
        let call = PendingCall {
            request_id: request.id,
            session_id: session.id(),
            submitted_at: request.created_at,
            completion,
        };

        session.push(request).await;
        record::call_submitted();
        tracing::debug!(
            session_id = %call.session_id,
            request_id = %call.request_id,
            "request queued"
        );

        call
    }

    /// Queue a call on `session` and wait up to `timeout` for its result.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Timeout`] if no response arrives in time.
    pub async fn enqueue_and_wait(
        &self,
        session: &Session,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        self.submit(session, payload).await.wait(timeout).await
    }

    /// Hand the oldest queued request to the worker, if any.
    pub async fn dequeue(&self, session: &Session) -> Option<PollResponse> {
        let dispatched = session.pop_front().await?;
        record::dispatched();
        tracing::debug!(
            session_id = %session.id(),
            request_id = %dispatched.request_id,
            "request dispatched"
        );
        Some(dispatched)
    }

    /// Long-poll: wait up to `budget` for a request to dequeue.
    ///
    /// Returns `None` if the budget elapses with nothing queued.
    pub async fn wait_for_work(&self, session: &Session, budget: Duration) -> Option<PollResponse> {
        let deadline = Instant::now() + budget;

        loop {
            if let Some(request) = self.dequeue(session).await {
                return Some(request);
            }

            if tokio::time::timeout_at(deadline, session.work_available())
                .await
                .is_err()
            {
                break;
            }
        }

        let last_chance = self.dequeue(session).await;
        if last_chance.is_none() {
            record::poll_empty();
        }
        last_chance
    }

    /// Deliver a worker's response to whoever is waiting for it.
    ///
    /// Responses for unknown, already answered, or still-queued request ids
    /// are discarded without touching session state.
    pub async fn deliver_response(
        &self,
        session: &Session,
        request_id: RequestId,
        response: Value,
    ) -> Delivery {
        let delivery = session.resolve(request_id, response).await;
        record::response(delivery.matched());

        match delivery {
            Delivery::Delivered => {
                tracing::debug!(session_id = %session.id(), request_id = %request_id, "response delivered");
            }
            Delivery::Abandoned => {
                tracing::info!(
                    session_id = %session.id(),
                    request_id = %request_id,
                    "response arrived after caller stopped waiting"
                );
            }
            Delivery::Unknown => {
                tracing::warn!(
                    session_id = %session.id(),
                    request_id = %request_id,
                    "response for unknown request"
                );
            }
        }

        delivery
    }
}
