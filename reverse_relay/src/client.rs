//! Worker-side client for the relay.
//!
//! [`ReverseClient`] registers a worker with the relay once, then keeps a
//! single poll loop running: poll for a call, hand it to the [`CallHandler`],
//! post the result, repeat.
//!
//! # Failure handling
//!
//! Registration is fail-fast: if it does not succeed, [`ReverseClient::start`]
//! returns the error and no loop is started. Once running, every failure
//! (unreachable relay, unexpected status, malformed poll, handler error, even
//! a panic inside a round) is logged and retried after the configured delay.
//! The loop only ends through [`ReverseClient::stop`].

mod caller;
mod handler;
mod poll_loop;

pub use caller::RelayCaller;
pub use handler::{CallHandler, HandlerFn, IncomingCall, handler_fn};

use alloc::{boxed::Box, string::String, sync::Arc};
use core::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_lock::Mutex;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::{
    DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS,
    error::StartError,
    http_client::HttpClient,
    id::SessionId,
    protocol::SESSION_ID_PARAM,
};

use poll_loop::{PollLoop, poll_loop};

/// Slack added to the poll timeout so the relay's 204 arrives before the
/// client gives up on the request.
const POLL_REQUEST_SLACK: Duration = Duration::from_secs(5);

/// Options for a worker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Registration path on the relay.
    pub register_path: String,

    /// Poll path on the relay.
    pub poll_path: String,

    /// Response delivery path on the relay.
    pub response_path: String,

    /// How long the relay holds a poll open.
    pub poll_timeout: Duration,

    /// Delay before retrying after a failed poll round.
    pub retry_delay: Duration,
}

impl ClientOptions {
    /// Timeout for individual HTTP requests to the relay.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.poll_timeout + POLL_REQUEST_SLACK
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            register_path: "/register".into(),
            poll_path: "/poll".into(),
            response_path: "/response".into(),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

/// Where [`ReverseClient::start`] runs the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Run the loop on the calling task; `start` returns after `stop`.
    Blocking,

    /// Spawn the loop as a background task; `start` returns immediately.
    Background,
}

/// State shared between the client handle and its poll loop.
#[derive(Debug)]
struct Shared<H, C> {
    base_url: Url,
    http: H,
    handler: C,
    options: ClientOptions,
}

impl<H, C> Shared<H, C> {
    fn endpoint(&self, path: &str) -> Result<Url, StartError> {
        self.base_url
            .join(path)
            .map_err(|e| StartError::InvalidUrl(e.to_string()))
    }

    fn session_endpoint(&self, path: &str, session_id: SessionId) -> Result<Url, StartError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .append_pair(SESSION_ID_PARAM, &session_id.to_hex());
        Ok(url)
    }
}

/// A worker's connection to the relay.
///
/// Cloning yields another handle to the same client, so one task can run the
/// loop in [`StartMode::Blocking`] while another calls [`stop`](Self::stop).
#[derive(Debug)]
pub struct ReverseClient<H, C> {
    shared: Arc<Shared<H, C>>,
    session_id: Arc<Mutex<Option<SessionId>>>,
    running: Arc<AtomicBool>,
    cancel: Arc<Mutex<CancellationToken>>,
    poll_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    loop_guard: Arc<Mutex<()>>,
}

impl<H, C> Clone for ReverseClient<H, C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            session_id: self.session_id.clone(),
            running: self.running.clone(),
            cancel: self.cancel.clone(),
            poll_handle: self.poll_handle.clone(),
            loop_guard: self.loop_guard.clone(),
        }
    }
}

impl<H: HttpClient, C: CallHandler> ReverseClient<H, C> {
    /// Create a client for the relay at `base_url`.
    #[must_use]
    pub fn new(base_url: Url, http: H, handler: C, options: ClientOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                base_url,
                http,
                handler,
                options,
            }),
            session_id: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            poll_handle: Arc::new(Mutex::new(None)),
            loop_guard: Arc::new(Mutex::new(())),
        }
    }

    /// The relay's base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.shared.base_url
    }

    /// The client options.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.shared.options
    }

    /// Whether the client has been started and not stopped.
    ///
    /// This is already `true` while registration is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The session assigned by the relay, once registered.
    pub async fn session_id(&self) -> Option<SessionId> {
        *self.session_id.lock().await
    }

    /// Register with the relay and start polling.
    ///
    /// Calling `start` on a running client logs a warning and does nothing.
    /// If [`stop`](Self::stop) is called while registration is in flight, the
    /// registration completes but no loop is started.
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] if registration fails; the poll loop is not
    /// started in that case.
    pub async fn start(&self, mode: StartMode) -> Result<(), StartError> {
        // Claim the client and the loop guard under the cancel lock, so a
        // concurrent `stop` either sees nothing to stop or cancels this run.
        let (token, guard) = {
            let mut cancel = self.cancel.lock().await;
            if self.running.swap(true, Ordering::SeqCst) {
                warn!("reverse client already running");
                return Ok(());
            }

            let guard = self.loop_guard.lock_arc().await;
            let token = CancellationToken::new();
            *cancel = token.clone();
            (token, guard)
        };

        info!(relay = %self.shared.base_url, "starting reverse client");

        let (session_id, poll_url, response_url) = match self.prepare().await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "failed to register with relay");
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        info!(session_id = %session_id, "registered with relay");
        *self.session_id.lock().await = Some(session_id);

        if token.is_cancelled() {
            info!(session_id = %session_id, "stopped during registration; not polling");
            return Ok(());
        }

        let poll_loop = poll_loop(
            PollLoop {
                shared: self.shared.clone(),
                session_id,
                poll_url,
                response_url,
                token,
            },
            guard,
        );

        match mode {
            StartMode::Blocking => poll_loop.await,
            StartMode::Background => {
                *self.poll_handle.lock().await = Some(tokio::spawn(poll_loop));
            }
        }

        Ok(())
    }

    /// Register and build the session's poll and response URLs.
    async fn prepare(&self) -> Result<(SessionId, Url, Url), StartError> {
        let session_id = self.register_with_relay().await?;
        let poll_url = self
            .shared
            .session_endpoint(&self.shared.options.poll_path, session_id)?;
        let response_url = self
            .shared
            .session_endpoint(&self.shared.options.response_path, session_id)?;
        Ok((session_id, poll_url, response_url))
    }

    /// Stop polling.
    ///
    /// Waits for an in-flight registration and for the poll loop to exit, so
    /// no relay request is issued after this returns. A call already picked
    /// up is still answered first.
    ///
    /// Must not be called from inside the [`CallHandler`].
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("stopping reverse client");
        self.cancel.lock().await.cancel();

        let handle = self.poll_handle.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(error = %e, "poll task failed");
        }

        // Registration and blocking-mode loops hold the guard on another task
        // until they finish.
        drop(self.loop_guard.lock().await);

        info!("reverse client stopped");
    }

    async fn register_with_relay(&self) -> Result<SessionId, StartError> {
        let url = self.shared.endpoint(&self.shared.options.register_path)?;
        info!(url = %url, "registering with relay");

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        let body = serde_json::to_vec(&json!({ "type": "worker", "timestamp": timestamp }))?;

        let response = self
            .shared
            .http
            .post_json(
                url.as_str(),
                body,
                Some(self.shared.options.request_timeout()),
            )
            .await
            .map_err(|e| StartError::Transport(Box::new(e)))?;

        if !response.is_success() {
            return Err(StartError::ServerError {
                status: response.status,
                message: response.text().into_owned(),
            });
        }

        let body: Value = serde_json::from_slice(&response.body)?;
        let raw = body
            .get(SESSION_ID_PARAM)
            .and_then(Value::as_str)
            .ok_or(StartError::MissingSessionId)?;

        SessionId::from_hex(raw).ok_or(StartError::InvalidSessionId)
    }
}
