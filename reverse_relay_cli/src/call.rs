//! The `call` subcommand: submit one call and print the worker's result.

use anyhow::{Context, Result};
use reverse_relay::{client::RelayCaller, http_client::ReqwestHttpClient, id::SessionId};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Arguments for the call command.
#[derive(Debug, clap::Parser)]
pub(crate) struct CallArgs {
    /// Base URL of the relay
    #[arg(short, long, default_value = "http://localhost:9000", env = "REVERSE_RELAY_URL")]
    pub(crate) relay: Url,

    /// Session to target (16 hex characters)
    #[arg(short, long, value_parser = parse_session_id)]
    pub(crate) session: Option<SessionId>,

    /// Call payload as JSON
    pub(crate) payload: String,
}

fn parse_session_id(s: &str) -> Result<SessionId, String> {
    SessionId::from_hex(s).ok_or_else(|| format!("invalid session id: {s}"))
}

/// Submit the call; Ctrl+C abandons the wait.
pub(crate) async fn run(args: CallArgs, token: CancellationToken) -> Result<()> {
    let payload: Value = serde_json::from_str(&args.payload).context("payload is not JSON")?;
    let caller = RelayCaller::new(&args.relay, ReqwestHttpClient::new())?;

    tokio::select! {
        result = caller.call(&payload, args.session) => {
            let result = result?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        () = token.cancelled() => {
            tracing::info!("call abandoned");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_validated() {
        assert!(parse_session_id("00112233445566ff").is_ok());
        assert!(parse_session_id("xyz").is_err());
    }
}
