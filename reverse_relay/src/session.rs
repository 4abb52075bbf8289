//! Per-worker session state.
//!
//! A [`Session`] owns the FIFO of calls waiting for the worker and the table
//! of calls the worker has picked up but not yet answered. A request id lives
//! in at most one of the two at any time: dequeue moves it from the queue to
//! the table, response delivery removes it from the table.
//!
//! ```text
//!  enqueue ──► pending (FIFO) ──dequeue──► in_flight ──resolve──► completion cell
//! ```
//!
//! The session lock is never held across a wait; completion cells are
//! fulfilled after the lock is released.

use alloc::collections::{BTreeMap, VecDeque};

use async_lock::Mutex;
use serde_json::Value;
use tokio::{
    sync::{Notify, oneshot},
    time::Instant,
};

use crate::{
    id::{RequestId, SessionId},
    protocol::PollResponse,
};

/// A call waiting in a session's queue.
#[derive(Debug)]
pub struct PendingRequest {
    /// Correlation id.
    pub id: RequestId,

    /// The caller's payload.
    pub payload: Value,

    /// When the call was submitted.
    pub created_at: Instant,

    completion: oneshot::Sender<Value>,
}

impl PendingRequest {
    /// Create a pending request with a fresh id, returning the receiving half
    /// of its completion cell.
    #[must_use]
    pub fn new(payload: Value) -> (Self, oneshot::Receiver<Value>) {
        let (completion, rx) = oneshot::channel();
        let request = Self {
            id: RequestId::random(),
            payload,
            created_at: Instant::now(),
            completion,
        };
        (request, rx)
    }
}

/// A call handed to the worker, awaiting its response.
#[derive(Debug)]
struct InFlightRequest {
    completion: oneshot::Sender<Value>,
    created_at: Instant,
    dispatched_at: Instant,
}

/// Outcome of delivering a response to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The waiting caller received the response.
    Delivered,

    /// The request was in flight but its caller had stopped waiting.
    Abandoned,

    /// No in-flight request with that id exists.
    Unknown,
}

impl Delivery {
    /// Whether the request id matched an in-flight request.
    #[must_use]
    pub const fn matched(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Point-in-time view of a session, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// The session id.
    pub id: SessionId,

    /// Number of queued requests.
    pub pending: usize,

    /// Number of dispatched, unanswered requests.
    pub in_flight: usize,

    /// When the session was registered.
    pub created_at: Instant,

    /// Last enqueue, dequeue, or response delivery.
    pub last_activity: Instant,
}

#[derive(Debug)]
struct SessionState {
    pending: VecDeque<PendingRequest>,
    in_flight: BTreeMap<RequestId, InFlightRequest>,
    last_activity: Instant,
}

/// One worker's channel with the relay.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: Instant,
    state: Mutex<SessionState>,
    work_available: Notify,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            state: Mutex::new(SessionState {
                pending: VecDeque::new(),
                in_flight: BTreeMap::new(),
                last_activity: now,
            }),
            work_available: Notify::new(),
        }
    }

    /// The session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// When the session was registered.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Append a request to the back of the queue and wake one poller.
    pub async fn push(&self, request: PendingRequest) {
        {
            let mut state = self.state.lock().await;
            state.pending.push_back(request);
            state.last_activity = Instant::now();
        }
        self.work_available.notify_one();
    }

    /// Pop the oldest queued request and move it in flight.
    ///
    /// Non-blocking: returns `None` when the queue is empty.
    pub async fn pop_front(&self) -> Option<PollResponse> {
        let mut state = self.state.lock().await;
        let PendingRequest {
            id,
            payload,
            created_at,
            completion,
        } = state.pending.pop_front()?;

        let now = Instant::now();
        state.in_flight.insert(
            id,
            InFlightRequest {
                completion,
                created_at,
                dispatched_at: now,
            },
        );
        state.last_activity = now;

        Some(PollResponse {
            request_id: id,
            request: payload,
        })
    }

    /// Resolve an in-flight request with the worker's response.
    ///
    /// Removal from the in-flight table happens under the lock, so at most
    /// one call per request id can ever reach the completion cell.
    pub async fn resolve(&self, request_id: RequestId, response: Value) -> Delivery {
        let entry = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.in_flight.remove(&request_id) else {
                return Delivery::Unknown;
            };
            state.last_activity = Instant::now();
            entry
        };

        tracing::trace!(
            session_id = %self.id,
            request_id = %request_id,
            queued_for = ?entry.dispatched_at.duration_since(entry.created_at),
            answered_after = ?entry.dispatched_at.elapsed(),
            "resolving in-flight request"
        );

        if entry.completion.send(response).is_ok() {
            Delivery::Delivered
        } else {
            Delivery::Abandoned
        }
    }

    /// Wait until a push wakes this session, or a permit left by an earlier
    /// push is consumed.
    pub(crate) async fn work_available(&self) {
        self.work_available.notified().await;
    }

    /// Whether the request is still queued.
    pub async fn is_pending(&self, request_id: RequestId) -> bool {
        self.state
            .lock()
            .await
            .pending
            .iter()
            .any(|r| r.id == request_id)
    }

    /// Whether the request has been dispatched and not yet answered.
    pub async fn is_in_flight(&self, request_id: RequestId) -> bool {
        self.state.lock().await.in_flight.contains_key(&request_id)
    }

    /// Last enqueue, dequeue, or response delivery.
    pub async fn last_activity(&self) -> Instant {
        self.state.lock().await.last_activity
    }

    /// Take a consistent snapshot of the session's counters.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            id: self.id,
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
            created_at: self.created_at,
            last_activity: state.last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> Session {
        Session::new(SessionId::random())
    }

    #[tokio::test]
    async fn pop_front_is_fifo() {
        let session = session();
        let mut ids = Vec::new();
        let mut receivers = Vec::new();
        for n in 0..10 {
            let (request, rx) = PendingRequest::new(json!({ "n": n }));
            ids.push(request.id);
            receivers.push(rx);
            session.push(request).await;
        }

        for (n, expected) in ids.iter().enumerate() {
            let popped = session.pop_front().await.expect("queued request");
            assert_eq!(popped.request_id, *expected);
            assert_eq!(popped.request, json!({ "n": n }));
        }
        assert!(session.pop_front().await.is_none());
    }

    #[tokio::test]
    async fn request_is_never_both_pending_and_in_flight() {
        let session = session();
        let (request, _rx) = PendingRequest::new(json!("call"));
        let id = request.id;

        session.push(request).await;
        assert!(session.is_pending(id).await);
        assert!(!session.is_in_flight(id).await);

        session.pop_front().await.expect("queued request");
        assert!(!session.is_pending(id).await);
        assert!(session.is_in_flight(id).await);

        assert_eq!(session.resolve(id, json!("done")).await, Delivery::Abandoned);
        assert!(!session.is_pending(id).await);
        assert!(!session.is_in_flight(id).await);
    }

    #[tokio::test]
    async fn resolve_fulfils_completion_once() {
        let session = session();
        let (request, rx) = PendingRequest::new(json!("call"));
        let id = request.id;
        session.push(request).await;
        session.pop_front().await.expect("queued request");

        assert_eq!(session.resolve(id, json!({"pong": true})).await, Delivery::Delivered);
        assert_eq!(rx.await.expect("fulfilled"), json!({"pong": true}));

        assert_eq!(session.resolve(id, json!("again")).await, Delivery::Unknown);
    }

    #[tokio::test]
    async fn resolve_unknown_leaves_state_unchanged() {
        let session = session();
        let (request, _rx) = PendingRequest::new(json!("first"));
        let first = request.id;
        session.push(request).await;
        let (request, _rx2) = PendingRequest::new(json!("second"));
        let second = request.id;
        session.push(request).await;
        session.pop_front().await.expect("queued request");

        let before = session.snapshot().await;
        assert_eq!(session.resolve(RequestId::random(), json!(null)).await, Delivery::Unknown);
        // A still-queued request cannot be answered either.
        assert_eq!(session.resolve(second, json!(null)).await, Delivery::Unknown);
        let after = session.snapshot().await;

        assert_eq!(before, after);
        assert_eq!(after.pending, 1);
        assert_eq!(after.in_flight, 1);
        assert!(session.is_in_flight(first).await);
        assert!(session.is_pending(second).await);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_is_touched_by_push_pop_and_resolve() {
        let session = session();
        let registered = session.last_activity().await;

        tokio::time::advance(core::time::Duration::from_secs(1)).await;
        let (request, _rx) = PendingRequest::new(json!(1));
        let id = request.id;
        session.push(request).await;
        let after_push = session.last_activity().await;
        assert!(after_push > registered);

        tokio::time::advance(core::time::Duration::from_secs(1)).await;
        session.pop_front().await.expect("queued request");
        let after_pop = session.last_activity().await;
        assert!(after_pop > after_push);

        tokio::time::advance(core::time::Duration::from_secs(1)).await;
        session.resolve(id, json!(2)).await;
        assert!(session.last_activity().await > after_pop);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_resolve_does_not_touch_activity() {
        let session = session();
        let before = session.last_activity().await;
        tokio::time::advance(core::time::Duration::from_secs(5)).await;
        session.resolve(RequestId::random(), json!(null)).await;
        assert_eq!(session.last_activity().await, before);
    }
}
