//! The `worker` subcommand: answer relayed calls with the demo tools.

use std::time::Duration;

use anyhow::Result;
use reverse_relay::{
    DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS,
    client::{ClientOptions, IncomingCall, ReverseClient, StartMode, handler_fn},
    http_client::ReqwestHttpClient,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::tools;

/// Arguments for the worker command.
#[derive(Debug, clap::Parser)]
pub(crate) struct WorkerArgs {
    /// Base URL of the relay
    #[arg(short, long, default_value = "http://localhost:9000", env = "REVERSE_RELAY_URL")]
    pub(crate) relay: Url,

    /// Seconds the relay holds each poll open
    #[arg(long, default_value_t = DEFAULT_POLL_TIMEOUT_SECS)]
    pub(crate) poll_timeout: u64,

    /// Seconds to wait after a failed poll round
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_SECS)]
    pub(crate) retry_delay: u64,
}

/// Register with the relay and serve calls until `token` is cancelled.
pub(crate) async fn run(args: WorkerArgs, token: CancellationToken) -> Result<()> {
    let options = ClientOptions {
        poll_timeout: Duration::from_secs(args.poll_timeout),
        retry_delay: Duration::from_secs(args.retry_delay),
        ..ClientOptions::default()
    };

    let handler = handler_fn(|call: IncomingCall| async move { tools::dispatch(&call) });
    let client = ReverseClient::new(args.relay, ReqwestHttpClient::new(), handler, options);

    client.start(StartMode::Background).await?;
    if let Some(session_id) = client.session_id().await {
        tracing::info!(
            %session_id,
            relay = %client.base_url(),
            poll_timeout = ?client.options().poll_timeout,
            tools = ?tools::TOOL_NAMES,
            "worker ready"
        );
    }

    token.cancelled().await;
    tracing::info!("shutting down worker...");
    client.stop().await;

    Ok(())
}
