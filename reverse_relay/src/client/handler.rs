//! The worker-side hook that turns a relayed call into a result.

use core::future::Future;

use futures::{FutureExt, future::BoxFuture};
use serde_json::Value;

use crate::{
    error::HandlerError,
    id::{RequestId, SessionId},
};

/// A call picked up from the relay, ready for local dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCall {
    /// Correlation id the response will be posted under.
    pub request_id: RequestId,

    /// The worker's own session.
    pub session_id: SessionId,

    /// The caller's payload, untouched by the relay.
    pub payload: Value,
}

/// Computes the result of a relayed call.
///
/// The poll loop hands every dequeued call to its handler and posts whatever
/// comes back. A handler error is posted as `{"error": <message>}`. A panic
/// fails the round: nothing is posted and the loop backs off before polling
/// again.
pub trait CallHandler: Send + Sync + 'static {
    /// Handle one call.
    fn handle(&self, call: IncomingCall) -> BoxFuture<'_, Result<Value, HandlerError>>;
}

/// A [`CallHandler`] built from an async closure. See [`handler_fn`].
#[derive(Debug, Clone, Copy)]
pub struct HandlerFn<F>(F);

/// Wrap an async closure as a [`CallHandler`].
///
/// ```
/// use reverse_relay::{
///     client::{IncomingCall, handler_fn},
///     error::HandlerError,
/// };
///
/// let echo = handler_fn(|call: IncomingCall| async move { Ok::<_, HandlerError>(call.payload) });
/// # let _ = echo;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn(f)
}

impl<F, Fut> CallHandler for HandlerFn<F>
where
    F: Fn(IncomingCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    fn handle(&self, call: IncomingCall) -> BoxFuture<'_, Result<Value, HandlerError>> {
        (self.0)(call).boxed()
    }
}
