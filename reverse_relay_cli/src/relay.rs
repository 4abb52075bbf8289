//! The `relay` subcommand: run the public relay server.

use std::{net::SocketAddr, time::Duration};

use anyhow::Result;
use reverse_relay::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_MAX_BODY_SIZE, DEFAULT_POLL_TIMEOUT_SECS,
    registry::RoutingPolicy, server::RelayServerBuilder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::metrics;

/// How untargeted calls pick a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Routing {
    /// Send to the longest-registered worker
    Oldest,

    /// Reject calls that do not name a session
    Require,
}

impl From<Routing> for RoutingPolicy {
    fn from(routing: Routing) -> Self {
        match routing {
            Routing::Oldest => Self::OldestSession,
            Routing::Require => Self::RequireTarget,
        }
    }
}

/// Arguments for the relay command.
#[derive(Debug, clap::Parser)]
pub(crate) struct RelayArgs {
    /// Socket address to listen on
    #[arg(short, long, default_value = "0.0.0.0:9000", env = "REVERSE_RELAY_LISTEN")]
    pub(crate) listen: SocketAddr,

    /// Seconds a poll is held open before answering 204
    #[arg(long, default_value_t = DEFAULT_POLL_TIMEOUT_SECS)]
    pub(crate) poll_timeout: u64,

    /// Seconds a caller waits for a worker before answering 504
    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    pub(crate) call_timeout: u64,

    /// Routing for calls without a session_id
    #[arg(long, value_enum, default_value_t = Routing::Oldest)]
    pub(crate) routing: Routing,

    /// Maximum request body size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_SIZE)]
    pub(crate) max_body_size: usize,

    /// Enable the Prometheus metrics server
    #[arg(long, default_value_t = false)]
    pub(crate) metrics: bool,

    /// Metrics server port (Prometheus endpoint)
    #[arg(long, default_value = "9090")]
    pub(crate) metrics_port: u16,
}

/// Run the relay until `token` is cancelled.
pub(crate) async fn run(args: RelayArgs, token: CancellationToken) -> Result<()> {
    if args.metrics {
        let handle = metrics::init_metrics()?;
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], args.metrics_port).into();
        metrics::start_metrics_server(metrics_addr, handle, token.clone()).await?;
    }

    let router = RelayServerBuilder::new()
        .routing(args.routing.into())
        .poll_timeout(Duration::from_secs(args.poll_timeout))
        .call_timeout(Duration::from_secs(args.call_timeout))
        .max_body_size(args.max_body_size)
        .into_router();

    let listener = TcpListener::bind(args.listen).await?;
    tracing::info!(
        addr = %args.listen,
        poll_timeout = args.poll_timeout,
        call_timeout = args.call_timeout,
        routing = ?args.routing,
        "relay listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    tracing::info!("relay shut down");
    Ok(())
}
