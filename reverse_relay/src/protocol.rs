//! JSON bodies exchanged between workers, callers, and the relay.
//!
//! | Exchange         | Route            | Request body              | Success body           |
//! |------------------|------------------|---------------------------|------------------------|
//! | Register         | `POST /register` | any JSON object           | [`RegisterResponse`]   |
//! | Poll             | `GET /poll`      | —                         | [`PollResponse`]       |
//! | Deliver response | `POST /response` | [`ResponseDelivery`]      | [`Ack`]                |
//! | Submit call      | `POST /message`  | opaque call payload       | opaque result payload  |
//!
//! Poll and response delivery carry the session in the `session_id` query
//! parameter. Call submission may carry it to target a specific worker.

use alloc::string::String;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{RequestId, SessionId};

/// Query parameter naming the session.
pub const SESSION_ID_PARAM: &str = "session_id";

/// Body returned by a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// The session assigned to the worker.
    pub session_id: SessionId,

    /// Path the worker should poll.
    pub poll_endpoint: String,

    /// Path the worker should post responses to.
    pub response_endpoint: String,
}

/// Body returned by a poll that found work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    /// Correlation id to echo back with the response.
    pub request_id: RequestId,

    /// The caller's payload, untouched.
    pub request: Value,
}

/// Body a worker posts to deliver a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDelivery {
    /// The id received with the request.
    pub request_id: RequestId,

    /// The worker's result, handed to the caller untouched.
    pub response: Value,
}

/// Acknowledgement of a response delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Always `"ok"`.
    pub status: String,
}

impl Ack {
    /// The acknowledgement sent for every accepted delivery.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
        }
    }
}

/// Body of every non-success response from the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_response_uses_snake_case_fields() {
        let body = PollResponse {
            request_id: RequestId::from_bytes([0xab; 8]),
            request: serde_json::json!({"op": "ping"}),
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"request_id": "abababababababab", "request": {"op": "ping"}})
        );
    }

    #[test]
    fn delivery_requires_both_fields() {
        let missing = serde_json::from_str::<ResponseDelivery>(r#"{"request_id":"0000000000000000"}"#);
        assert!(missing.is_err());

        let ok = serde_json::from_str::<ResponseDelivery>(
            r#"{"request_id":"0000000000000000","response":null}"#,
        );
        assert!(ok.is_ok());
    }
}
