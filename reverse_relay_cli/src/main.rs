//! Command-line entry point for the reverse relay.

mod call;
mod metrics;
mod relay;
mod tools;
mod worker;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let token = CancellationToken::new();
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let token = token.clone();
        let hits = hits.clone();
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_ok() {
                    if hits.fetch_add(1, Ordering::Relaxed) == 0 {
                        eprintln!("Ctrl+C: shutting down gracefully (press again to force)");
                        token.cancel();
                    } else {
                        eprintln!("Force exiting.");
                        std::process::exit(130);
                    }
                }
            }
        });
    }

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let t = token.clone();
        tokio::spawn(async move {
            if let Ok(mut term) = signal(SignalKind::terminate()) {
                term.recv().await;
                eprintln!("SIGTERM: shutting down gracefully");
                t.cancel();
            }
        });
    }

    let args = Arguments::parse();

    match args.command {
        Command::Relay(args) => relay::run(args, token).await,
        Command::Worker(args) => worker::run(args, token).await,
        Command::Call(args) => call::run(args, token).await,
    }
}

#[derive(Debug, Parser)]
#[command(version, about = "Long-poll relay for workers behind NAT")]
struct Arguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the public relay server
    Relay(relay::RelayArgs),

    /// Register with a relay and answer calls with the demo tools
    Worker(worker::WorkerArgs),

    /// Submit one call through a relay and print the result
    Call(call::CallArgs),
}
