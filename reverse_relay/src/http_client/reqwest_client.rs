//! [`reqwest`]-backed implementation of [`HttpClient`].

use alloc::vec::Vec;
use core::time::Duration;

use futures::{FutureExt, future::BoxFuture};

use super::{HttpClient, HttpResponse};

/// Error type for the reqwest-based HTTP client.
#[derive(Debug, thiserror::Error)]
#[error("HTTP request failed: {0}")]
pub struct ReqwestHttpError(#[from] reqwest::Error);

/// A [`reqwest`]-backed implementation of [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new reqwest-backed HTTP client with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
        }
    }

    /// Create a new reqwest-backed HTTP client with a custom timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn execute(
        &self,
        mut builder: reqwest::RequestBuilder,
        timeout: Option<Duration>,
    ) -> BoxFuture<'_, Result<HttpResponse, ReqwestHttpError>> {
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        async move {
            let resp = builder.send().await?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await?.to_vec();
            Ok(HttpResponse { status, body })
        }
        .boxed()
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    type Error = ReqwestHttpError;

    fn get(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> BoxFuture<'_, Result<HttpResponse, Self::Error>> {
        self.execute(self.inner.get(url), timeout)
    }

    fn post_json(
        &self,
        url: &str,
        body: Vec<u8>,
        timeout: Option<Duration>,
    ) -> BoxFuture<'_, Result<HttpResponse, Self::Error>> {
        let builder = self
            .inner
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        self.execute(builder, timeout)
    }
}
