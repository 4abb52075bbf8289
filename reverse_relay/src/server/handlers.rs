//! HTTP request handlers for the relay.

use alloc::{string::String, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use super::state::RelayServerState;
use crate::{
    error::{CallError, ServerError},
    id::{RequestId, SessionId},
    metrics::record,
    protocol::{Ack, ErrorBody, RegisterResponse},
};

/// Path workers register on.
pub const REGISTER_PATH: &str = "/register";

/// Path workers long-poll for work.
pub const POLL_PATH: &str = "/poll";

/// Path workers deliver responses to.
pub const RESPONSE_PATH: &str = "/response";

/// Path callers submit calls to.
pub const MESSAGE_PATH: &str = "/message";

/// A response delivery as posted, before the request id is checked.
///
/// The id stays a plain string so a malformed one is handled like any other
/// id this relay never issued.
#[derive(Debug, Deserialize)]
struct RawDelivery {
    request_id: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: Option<String>,
}

impl SessionQuery {
    /// The session named by the query.
    ///
    /// A malformed id cannot name a registered session, so it is reported
    /// the same way as an unknown one.
    fn required(&self) -> Result<SessionId, ServerError> {
        let raw = self
            .session_id
            .as_deref()
            .ok_or(ServerError::MissingSessionId)?;
        SessionId::from_hex(raw).ok_or(ServerError::SessionNotFound)
    }

    fn optional(&self) -> Result<Option<SessionId>, ServerError> {
        match self.session_id.as_deref() {
            None => Ok(None),
            Some(raw) => SessionId::from_hex(raw)
                .map(Some)
                .ok_or(ServerError::SessionNotFound),
        }
    }
}

/// Create the Axum router for the relay.
pub fn router(state: Arc<RelayServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(REGISTER_PATH, post(handle_register))
        .route(POLL_PATH, get(handle_poll))
        .route(RESPONSE_PATH, post(handle_response))
        .route(MESSAGE_PATH, post(handle_message))
        .layer(DefaultBodyLimit::max(state.max_body_size))
        .layer(cors)
        .with_state(state)
}

/// Handle worker registration.
async fn handle_register(
    State(state): State<Arc<RelayServerState>>,
    body: Bytes,
) -> Result<Json<RegisterResponse>, ServerError> {
    let metadata: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "failed to decode registration");
        ServerError::InvalidBody("Invalid request".into())
    })?;
    if !metadata.is_object() {
        warn!(?metadata, "registration body is not an object");
        return Err(ServerError::InvalidBody("Invalid request".into()));
    }

    let session = state.relay.register().await;
    let sessions = state.relay.registry().len().await;
    info!(
        session_id = %session.id(),
        sessions,
        ?metadata,
        "worker registered"
    );

    Ok(Json(RegisterResponse {
        session_id: session.id(),
        poll_endpoint: POLL_PATH.into(),
        response_endpoint: RESPONSE_PATH.into(),
    }))
}

/// Handle poll requests (long-polling for queued calls).
async fn handle_poll(
    State(state): State<Arc<RelayServerState>>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, ServerError> {
    let session_id = query.required()?;
    let session = state.relay.registry().lookup(session_id).await?;

    match state
        .relay
        .wait_for_work(&session, state.poll_timeout)
        .await
    {
        Some(work) => Ok(Json(work).into_response()),
        None => {
            debug!(session_id = %session_id, "poll timed out with no work");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

/// Handle response delivery from a worker.
async fn handle_response(
    State(state): State<Arc<RelayServerState>>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Result<Json<Ack>, ServerError> {
    let session_id = query.required()?;
    let session = state.relay.registry().lookup(session_id).await?;

    let RawDelivery {
        request_id,
        response,
    } = serde_json::from_slice(&body).map_err(|e| {
        warn!(session_id = %session_id, error = %e, "failed to decode response delivery");
        ServerError::InvalidBody("Invalid response format".into())
    })?;

    // Unknown request ids are accepted; the delivery outcome is only logged.
    match RequestId::from_hex(&request_id) {
        Some(request_id) => {
            state
                .relay
                .deliver_response(&session, request_id, response)
                .await;
        }
        None => {
            record::response(false);
            warn!(
                session_id = %session_id,
                request_id = %request_id,
                "response for malformed request id"
            );
        }
    }

    Ok(Json(Ack::ok()))
}

/// Handle call submission from a caller.
async fn handle_message(
    State(state): State<Arc<RelayServerState>>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Result<Json<Value>, ServerError> {
    let target = query.optional()?;
    let session = state.relay.registry().route(target).await?;

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "failed to decode call");
        ServerError::InvalidBody("Invalid request".into())
    })?;

    let result = state
        .relay
        .enqueue_and_wait(&session, payload, state.call_timeout)
        .await?;

    Ok(Json(result))
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MissingSessionId | Self::InvalidBody(_) | Self::Call(CallError::MissingTarget) => {
                StatusCode::BAD_REQUEST
            }
            Self::SessionNotFound | Self::Call(CallError::SessionNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Call(CallError::NoWorkers) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Call(CallError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Self::Call(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match self {
            Self::MissingSessionId => "Missing session_id".into(),
            Self::SessionNotFound | Self::Call(CallError::SessionNotFound(_)) => {
                "Session not found".into()
            }
            Self::Call(CallError::NoWorkers) => "No workers available".into(),
            Self::Call(CallError::Timeout) => "Request timeout".into(),
            Self::InvalidBody(message) => message,
            Self::Call(other) => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
