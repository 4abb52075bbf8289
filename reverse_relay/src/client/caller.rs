//! Caller-side helper for submitting calls through the relay.

use alloc::{boxed::Box, string::String};
use core::time::Duration;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::{
    DEFAULT_CALL_TIMEOUT_SECS,
    error::CallError,
    http_client::{HttpClient, HttpResponse},
    id::SessionId,
    protocol::{ErrorBody, SESSION_ID_PARAM},
};

/// Slack on top of the relay's own call timeout, so the relay's 504 is seen
/// instead of a local transport timeout.
const CALL_REQUEST_SLACK: Duration = Duration::from_secs(5);

/// Submits calls to a relay's `/message` route and returns worker results.
#[derive(Debug, Clone)]
pub struct RelayCaller<H> {
    message_url: Url,
    http: H,
    timeout: Duration,
}

impl<H: HttpClient> RelayCaller<H> {
    /// Create a caller for the relay at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if the message URL cannot be built.
    pub fn new(base_url: &Url, http: H) -> Result<Self, url::ParseError> {
        Ok(Self {
            message_url: base_url.join("/message")?,
            http,
            timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS) + CALL_REQUEST_SLACK,
        })
    }

    /// Override the local request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Submit `payload` and wait for the worker's result.
    ///
    /// With `target` set the call goes to that session; otherwise the relay
    /// routes it by its own policy.
    ///
    /// # Errors
    ///
    /// Relay statuses map onto [`CallError`]: 504 is [`CallError::Timeout`],
    /// 503 is [`CallError::NoWorkers`], 404 is [`CallError::SessionNotFound`]
    /// and 400 is [`CallError::Rejected`].
    pub async fn call(
        &self,
        payload: &Value,
        target: Option<SessionId>,
    ) -> Result<Value, CallError> {
        let mut url = self.message_url.clone();
        if let Some(target) = target {
            url.query_pairs_mut()
                .append_pair(SESSION_ID_PARAM, &target.to_hex());
        }

        let body = serde_json::to_vec(payload)?;
        debug!(url = %url, "submitting call");

        let response = self
            .http
            .post_json(url.as_str(), body, Some(self.timeout))
            .await
            .map_err(|e| CallError::Transport(Box::new(e)))?;

        match (response.status, target) {
            (200, _) => Ok(serde_json::from_slice(&response.body)?),
            (504, _) => Err(CallError::Timeout),
            (503, _) => Err(CallError::NoWorkers),
            (404, Some(target)) => Err(CallError::SessionNotFound(target)),
            (400, _) => Err(CallError::Rejected(error_message(&response))),
            (status, _) => Err(CallError::UnexpectedStatus {
                status,
                message: error_message(&response),
            }),
        }
    }
}

fn error_message(response: &HttpResponse) -> String {
    serde_json::from_slice::<ErrorBody>(&response.body)
        .map_or_else(|_| response.text().into_owned(), |body| body.error)
}
