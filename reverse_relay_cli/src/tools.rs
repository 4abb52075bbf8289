//! Demo tools served by the `worker` subcommand.
//!
//! A call payload names a tool and its arguments:
//!
//! ```json
//! {"name": "calculator", "arguments": {"operation": "add", "a": 15, "b": 27}}
//! ```
//!
//! Results come back as `{"content": [{"type": "text", "text": "..."}]}`.

use std::time::{SystemTime, UNIX_EPOCH};

use reverse_relay::{client::IncomingCall, error::HandlerError};
use serde_json::{Value, json};

/// Names of the tools [`dispatch`] understands.
pub(crate) const TOOL_NAMES: [&str; 3] = ["get_time", "calculator", "echo"];

/// Run the tool named in `call`.
pub(crate) fn dispatch(call: &IncomingCall) -> Result<Value, HandlerError> {
    let name = call
        .payload
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("missing tool name"))?;
    let args = call.payload.get("arguments").unwrap_or(&Value::Null);

    tracing::info!(tool = name, session_id = %call.session_id, "tool called");

    let text = match name {
        "get_time" => get_time(),
        "calculator" => calculator(args)?,
        "echo" => echo(args)?,
        other => return Err(HandlerError::new(format!("unknown tool: {other}"))),
    };

    Ok(json!({ "content": [{ "type": "text", "text": text }] }))
}

fn get_time() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    format!("Current time: {secs} seconds since the Unix epoch")
}

fn number(args: &Value, key: &str) -> Result<f64, HandlerError> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| HandlerError::new(format!("missing number argument: {key}")))
}

fn calculator(args: &Value) -> Result<String, HandlerError> {
    let operation = args
        .get("operation")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("missing operation"))?;
    let a = number(args, "a")?;
    let b = number(args, "b")?;

    let result = match operation {
        "add" => a + b,
        "subtract" => a - b,
        "multiply" => a * b,
        "divide" if b == 0.0 => return Err(HandlerError::new("division by zero")),
        "divide" => a / b,
        other => return Err(HandlerError::new(format!("unknown operation: {other}"))),
    };

    Ok(format!("Result: {result}"))
}

fn echo(args: &Value) -> Result<String, HandlerError> {
    let text = args
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("missing text"))?;
    let uppercase = args
        .get("uppercase")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(if uppercase {
        text.to_uppercase()
    } else {
        text.to_owned()
    })
}
