//! The worker's poll-dispatch-respond loop.

use alloc::{
    boxed::Box,
    string::{String, ToString},
    sync::Arc,
};
use core::panic::AssertUnwindSafe;

use async_lock::MutexGuardArc;
use futures::FutureExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{CallHandler, IncomingCall, Shared};
use crate::{
    error::{HandlerError, TransportError},
    http_client::HttpClient,
    id::{RequestId, SessionId},
    protocol::{PollResponse, ResponseDelivery},
};

/// Everything one running loop needs.
pub(super) struct PollLoop<H, C> {
    pub(super) shared: Arc<Shared<H, C>>,
    pub(super) session_id: SessionId,
    pub(super) poll_url: Url,
    pub(super) response_url: Url,
    pub(super) token: CancellationToken,
}

/// Run rounds until cancelled.
///
/// A failed round is followed by the retry delay; nothing else ends the loop.
/// `_guard` is held for the loop's whole lifetime so `stop` can wait on it.
pub(super) async fn poll_loop<H: HttpClient, C: CallHandler>(
    ctx: PollLoop<H, C>,
    _guard: MutexGuardArc<()>,
) {
    info!(session_id = %ctx.session_id, "starting poll loop");

    let retry_delay = ctx.shared.options.retry_delay;
    let mut consecutive_failures = 0u32;

    loop {
        if ctx.token.is_cancelled() {
            break;
        }

        let outcome = AssertUnwindSafe(process_round(&ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(RoundError::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(RoundOutcome::Idle) => {
                consecutive_failures = 0;
                debug!("no work, polling again");
            }
            Ok(RoundOutcome::Answered(request_id)) => {
                consecutive_failures = 0;
                debug!(request_id = %request_id, "call answered");
            }
            Ok(RoundOutcome::Cancelled) => break,
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                if matches!(e, RoundError::Panicked(_)) {
                    error!(error = %e, consecutive_failures, "poll round panicked");
                } else {
                    warn!(
                        error = %e,
                        consecutive_failures,
                        retry_in = ?retry_delay,
                        "poll round failed"
                    );
                }

                tokio::select! {
                    () = ctx.token.cancelled() => break,
                    () = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }

    info!(session_id = %ctx.session_id, "poll loop exited");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundOutcome {
    /// The poll came back empty.
    Idle,

    /// A call was handled and its result accepted by the relay.
    Answered(RequestId),

    /// Stopped while waiting on the poll.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
enum RoundError {
    #[error("transport error: {0}")]
    Transport(TransportError),

    #[error("poll returned status {0}")]
    UnexpectedStatus(u16),

    #[error("malformed poll response: {0}")]
    MalformedPoll(serde_json::Error),

    #[error("failed to encode response: {0}")]
    Encode(serde_json::Error),

    #[error("relay rejected response with status {0}")]
    ResponseRejected(u16),

    #[error("round panicked: {0}")]
    Panicked(String),
}

/// One poll, and if it yields a call, one dispatch and one response post.
///
/// Only the poll itself is interrupted by cancellation. A call already
/// picked up is always handled and posted; a handler error is posted as an
/// error payload so the caller hears about it without waiting out its
/// timeout.
async fn process_round<H: HttpClient, C: CallHandler>(
    ctx: &PollLoop<H, C>,
) -> Result<RoundOutcome, RoundError> {
    let shared = &ctx.shared;
    let timeout = Some(shared.options.request_timeout());

    let response = tokio::select! {
        () = ctx.token.cancelled() => return Ok(RoundOutcome::Cancelled),
        response = shared.http.get(ctx.poll_url.as_str(), timeout) => {
            response.map_err(|e| RoundError::Transport(Box::new(e)))?
        }
    };

    match response.status {
        204 => return Ok(RoundOutcome::Idle),
        200 => {}
        other => return Err(RoundError::UnexpectedStatus(other)),
    }

    let PollResponse {
        request_id,
        request,
    } = serde_json::from_slice(&response.body).map_err(RoundError::MalformedPoll)?;
    debug!(request_id = %request_id, "received call");

    let response = shared
        .handler
        .handle(IncomingCall {
            request_id,
            session_id: ctx.session_id,
            payload: request,
        })
        .await
        .unwrap_or_else(|e| {
            warn!(request_id = %request_id, error = %e, "call handler failed");
            error_response(&e)
        });

    let body = serde_json::to_vec(&ResponseDelivery {
        request_id,
        response,
    })
    .map_err(RoundError::Encode)?;

    let posted = shared
        .http
        .post_json(ctx.response_url.as_str(), body, timeout)
        .await
        .map_err(|e| RoundError::Transport(Box::new(e)))?;

    if !posted.is_success() {
        return Err(RoundError::ResponseRejected(posted.status));
    }

    Ok(RoundOutcome::Answered(request_id))
}

/// The result posted for a call whose handler failed.
fn error_response(err: &HandlerError) -> Value {
    json!({ "error": err.message() })
}

fn panic_message(panic: &(dyn core::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
