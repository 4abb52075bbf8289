//! Generic HTTP client trait for the worker and caller sides.
//!
//! This abstracts over the HTTP client implementation so the poll loop can be
//! driven by something other than a live network connection.

mod reqwest_client;

pub use reqwest_client::{ReqwestHttpClient, ReqwestHttpError};

use alloc::{borrow::Cow, vec::Vec};
use core::time::Duration;

use futures::future::BoxFuture;

/// A minimal async HTTP client for JSON requests.
///
/// Implementations handle the mechanics of making HTTP requests (TLS,
/// connection pooling, etc.) while this trait exposes only what the relay
/// exchanges need.
pub trait HttpClient: Clone + Send + Sync + 'static {
    /// The error type for HTTP operations.
    type Error: core::error::Error + Send + Sync + 'static;

    /// Send an HTTP GET request and return the response.
    ///
    /// `timeout` overrides the client's default request timeout.
    fn get(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> BoxFuture<'_, Result<HttpResponse, Self::Error>>;

    /// Send an HTTP POST request with a JSON body and return the response.
    ///
    /// `timeout` overrides the client's default request timeout.
    fn post_json(
        &self,
        url: &str,
        body: Vec<u8>,
        timeout: Option<Duration>,
    ) -> BoxFuture<'_, Result<HttpResponse, Self::Error>>;
}

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: u16,

    /// The response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// The body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        alloc::string::String::from_utf8_lossy(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        let response = |status| HttpResponse {
            status,
            body: Vec::new(),
        };
        assert!(response(200).is_success());
        assert!(response(204).is_success());
        assert!(!response(199).is_success());
        assert!(!response(404).is_success());
        assert!(!response(504).is_success());
    }
}
