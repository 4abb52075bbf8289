//! Prometheus exporter for the relay's metrics.
//!
//! Metric names and recording live in [`reverse_relay::metrics`]; this module
//! only installs the recorder and serves it.

use std::net::SocketAddr;

use anyhow::Context;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Install the Prometheus recorder.
///
/// Must be called once, before any metric is recorded.
pub(crate) fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Serve `/metrics` on `addr` until `token` is cancelled.
pub(crate) async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics server listening");

    tokio::spawn(async move {
        let shutdown = async move { token.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "metrics server error");
        }
    });

    Ok(())
}
