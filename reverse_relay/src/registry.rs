//! Registry of worker sessions.
//!
//! Each [`Relay`](crate::relay::Relay) owns exactly one registry; there is no
//! process-wide instance. Sessions are added by registration and never
//! removed.

use alloc::{collections::BTreeMap, sync::Arc};

use async_lock::RwLock;

use crate::{
    error::{CallError, SessionNotFound},
    id::SessionId,
    session::Session,
};

/// How a call without an explicit target picks a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// Route to the session that registered first.
    #[default]
    OldestSession,

    /// Reject calls that do not name a session.
    RequireTarget,
}

/// Thread-safe map from [`SessionId`] to [`Session`].
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<SessionId, Arc<Session>>>,
    routing: RoutingPolicy,
}

impl SessionRegistry {
    /// Create an empty registry with the given routing policy.
    #[must_use]
    pub fn new(routing: RoutingPolicy) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            routing,
        }
    }

    /// The policy applied to untargeted calls.
    #[must_use]
    pub const fn routing(&self) -> RoutingPolicy {
        self.routing
    }

    /// Create and insert a new empty session.
    pub async fn create_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(SessionId::random()));
        self.sessions
            .write()
            .await
            .insert(session.id(), session.clone());

        tracing::info!(session_id = %session.id(), "created session");
        session
    }

    /// Look up a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionNotFound`] if the id was never registered.
    pub async fn lookup(&self, id: SessionId) -> Result<Arc<Session>, SessionNotFound> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionNotFound(id))
    }

    /// Pick the session that should serve a call.
    ///
    /// # Errors
    ///
    /// * [`CallError::SessionNotFound`] if `target` names an unknown session.
    /// * [`CallError::MissingTarget`] if `target` is absent and the policy is
    ///   [`RoutingPolicy::RequireTarget`].
    /// * [`CallError::NoWorkers`] if no session is registered.
    pub async fn route(&self, target: Option<SessionId>) -> Result<Arc<Session>, CallError> {
        if let Some(id) = target {
            return Ok(self.lookup(id).await?);
        }

        match self.routing {
            RoutingPolicy::RequireTarget => Err(CallError::MissingTarget),
            RoutingPolicy::OldestSession => self
                .sessions
                .read()
                .await
                .values()
                .min_by_key(|s| (s.created_at(), s.id()))
                .cloned()
                .ok_or(CallError::NoWorkers),
        }
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no worker has registered yet.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
