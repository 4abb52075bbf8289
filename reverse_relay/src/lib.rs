//! # Reverse Relay
//!
//! A long-poll relay that lets a worker behind NAT or a firewall answer
//! remote procedure calls. The worker connects outward to a public relay and
//! asks for work; callers submit calls to the relay and block until the
//! worker's result comes back.
//!
//! # Protocol
//!
//! ```text
//! ┌──────────┐               ┌──────────┐                ┌──────────┐
//! │  Caller   │               │  Relay    │                │  Worker   │
//! └────┬─────┘               └────┬─────┘                └────┬─────┘
//!      │                          │  POST /register            │
//!      │                          │ ◄───────────────────────── │
//!      │                          │  200 {session_id, ...}     │
//!      │                          │ ─────────────────────────► │
//!      │                          │  GET /poll?session_id=     │
//!      │  POST /message           │ ◄───────────────────────── │
//!      │ ───────────────────────► │       ... (blocks) ...     │
//!      │     ... (blocks) ...     │  200 {request_id, request} │
//!      │                          │ ─────────────────────────► │
//!      │                          │  POST /response            │
//!      │                          │ ◄───────────────────────── │
//!      │  200 <result>            │  200 {"status": "ok"}      │
//!      │ ◄─────────────────────── │ ─────────────────────────► │
//! ```
//!
//! A poll that finds nothing within its budget answers 204 No Content and
//! the worker polls again. A caller that waits past its budget gets 504.
//!
//! ## Features
//!
//! - `server` — relay HTTP server using [`axum`]
//! - `client` — worker poll loop and caller helper using [`reqwest`]

extern crate alloc;

pub mod error;
pub mod id;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod session;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "client")]
pub mod http_client;

#[cfg(feature = "server")]
pub mod server;

/// Default long-poll timeout in seconds.
///
/// If no call is queued after this duration, `/poll` returns 204 No Content
/// and the worker should poll again.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Default time a caller waits for a worker's response, in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;

/// Default delay before a worker retries after a failed poll round, in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Default maximum HTTP request body size (50 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;
