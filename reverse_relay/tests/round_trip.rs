//! Integration tests for the relay over real HTTP.
//!
//! Each test binds a relay on an ephemeral port and drives it with workers
//! and callers using the reqwest-backed client.

#![allow(
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::unwrap_used,
    missing_docs,
    unreachable_pub
)]

use std::{
    net::SocketAddr,
    sync::OnceLock,
    time::{Duration, Instant},
};

use reverse_relay::{
    client::{ClientOptions, IncomingCall, RelayCaller, ReverseClient, StartMode, handler_fn},
    error::{CallError, HandlerError},
    http_client::{HttpClient, HttpResponse, ReqwestHttpClient},
    id::SessionId,
    protocol::{Ack, ErrorBody, PollResponse, RegisterResponse, ResponseDelivery},
    registry::RoutingPolicy,
    server::RelayServerBuilder,
};
use serde_json::{Value, json};
use testresult::TestResult;
use tokio::{net::TcpListener, task::JoinHandle};
use url::Url;

const POLL_TIMEOUT: Duration = Duration::from_millis(300);
const CALL_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    static ONCE: OnceLock<()> = OnceLock::new();
    ONCE.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

// ─── Test Server Harness ─────────────────────────────────────────────────────

struct TestServer {
    address: SocketAddr,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn start(builder: RelayServerBuilder) -> Self {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        let router = builder.into_router();

        let task = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });

        Self { address, task }
    }

    async fn with_defaults() -> Self {
        Self::start(
            RelayServerBuilder::new()
                .poll_timeout(POLL_TIMEOUT)
                .call_timeout(CALL_TIMEOUT),
        )
        .await
    }

    fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}", self.address)).expect("base url")
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{path_and_query}", self.address)
    }

    fn caller(&self) -> RelayCaller<ReqwestHttpClient> {
        RelayCaller::new(&self.base_url(), http()).expect("caller")
    }

    async fn register(&self) -> SessionId {
        let response = http()
            .post_json(&self.url("/register"), b"{}".to_vec(), None)
            .await
            .expect("register");
        assert_eq!(response.status, 200);
        let body: RegisterResponse = serde_json::from_slice(&response.body).expect("decode");
        assert_eq!(body.poll_endpoint, "/poll");
        assert_eq!(body.response_endpoint, "/response");
        body.session_id
    }

    async fn poll(&self, session_id: &str) -> HttpResponse {
        http()
            .get(&self.url(&format!("/poll?session_id={session_id}")), None)
            .await
            .expect("poll")
    }

    async fn respond(&self, session_id: &str, body: Vec<u8>) -> HttpResponse {
        http()
            .post_json(
                &self.url(&format!("/response?session_id={session_id}")),
                body,
                None,
            )
            .await
            .expect("respond")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn http() -> ReqwestHttpClient {
    ReqwestHttpClient::with_timeout(REQUEST_TIMEOUT)
}

fn error_of(response: &HttpResponse) -> String {
    serde_json::from_slice::<ErrorBody>(&response.body)
        .expect("error body")
        .error
}

fn worker(
    server: &TestServer,
    tag: &'static str,
) -> ReverseClient<ReqwestHttpClient, impl reverse_relay::client::CallHandler> {
    let options = ClientOptions {
        poll_timeout: POLL_TIMEOUT,
        retry_delay: Duration::from_millis(100),
        ..ClientOptions::default()
    };

    ReverseClient::new(
        server.base_url(),
        http(),
        handler_fn(move |call: IncomingCall| async move {
            Ok::<_, HandlerError>(json!({ "worker": tag, "echo": call.payload }))
        }),
        options,
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn call_round_trips_through_worker() -> TestResult {
    let server = TestServer::with_defaults().await;
    let worker = worker(&server, "alpha");
    worker.start(StartMode::Background).await?;

    let result = server
        .caller()
        .call(&json!({"op": "sum", "args": [1, 2]}), None)
        .await?;

    assert_eq!(
        result,
        json!({"worker": "alpha", "echo": {"op": "sum", "args": [1, 2]}})
    );

    worker.stop().await;
    Ok(())
}

#[tokio::test]
async fn sequential_calls_survive_idle_polls() -> TestResult {
    let server = TestServer::with_defaults().await;
    let worker = worker(&server, "alpha");
    worker.start(StartMode::Background).await?;
    let caller = server.caller();

    for i in 0..3 {
        // Let a few empty polls go by between calls.
        tokio::time::sleep(POLL_TIMEOUT * 2).await;
        let result = caller.call(&json!(i), None).await?;
        assert_eq!(result["echo"], json!(i));
    }

    assert!(worker.is_running());
    worker.stop().await;
    Ok(())
}

#[tokio::test]
async fn targeted_call_reaches_named_worker() -> TestResult {
    let server = TestServer::start(
        RelayServerBuilder::new()
            .routing(RoutingPolicy::RequireTarget)
            .poll_timeout(POLL_TIMEOUT)
            .call_timeout(CALL_TIMEOUT),
    )
    .await;

    let alpha = worker(&server, "alpha");
    let beta = worker(&server, "beta");
    alpha.start(StartMode::Background).await?;
    beta.start(StartMode::Background).await?;

    let caller = server.caller();
    let beta_id = beta.session_id().await.expect("beta registered");
    let result = caller.call(&json!("hi"), Some(beta_id)).await?;
    assert_eq!(result["worker"], "beta");

    let untargeted = caller.call(&json!("hi"), None).await;
    assert!(matches!(untargeted, Err(CallError::Rejected(_))));

    alpha.stop().await;
    beta.stop().await;
    Ok(())
}

#[tokio::test]
async fn empty_poll_returns_no_content() -> TestResult {
    let server = TestServer::with_defaults().await;
    let session_id = server.register().await;

    let response = server.poll(&session_id.to_hex()).await;
    assert_eq!(response.status, 204);
    assert!(response.body.is_empty());
    Ok(())
}

#[tokio::test]
async fn caller_timeout_then_late_response_is_accepted() -> TestResult {
    let server = TestServer::start(
        RelayServerBuilder::new()
            .poll_timeout(POLL_TIMEOUT)
            .call_timeout(Duration::from_millis(200)),
    )
    .await;
    let session_id = server.register().await;

    let timed_out = server.caller().call(&json!({"slow": true}), None).await;
    assert!(matches!(timed_out, Err(CallError::Timeout)));

    // The call is still queued; the worker picks it up and answers late.
    let polled = server.poll(&session_id.to_hex()).await;
    assert_eq!(polled.status, 200);
    let PollResponse {
        request_id,
        request,
    } = serde_json::from_slice(&polled.body)?;
    assert_eq!(request, json!({"slow": true}));

    let late = serde_json::to_vec(&ResponseDelivery {
        request_id,
        response: json!("too late"),
    })?;
    let ack = server.respond(&session_id.to_hex(), late.clone()).await;
    assert_eq!(ack.status, 200);
    assert_eq!(serde_json::from_slice::<Ack>(&ack.body)?, Ack::ok());

    // A duplicate delivery is accepted and ignored as well.
    let again = server.respond(&session_id.to_hex(), late).await;
    assert_eq!(again.status, 200);
    Ok(())
}

#[tokio::test]
async fn unknown_session_is_not_found() -> TestResult {
    let server = TestServer::with_defaults().await;
    let unknown = SessionId::random().to_hex();

    let polled = server.poll(&unknown).await;
    assert_eq!(polled.status, 404);
    assert_eq!(error_of(&polled), "Session not found");

    let body = serde_json::to_vec(&json!({"request_id": "0000000000000001", "response": 1}))?;
    let responded = server.respond(&unknown, body).await;
    assert_eq!(responded.status, 404);

    let malformed = server.poll("not-an-id").await;
    assert_eq!(malformed.status, 404);
    Ok(())
}

#[tokio::test]
async fn no_workers_is_service_unavailable() -> TestResult {
    let server = TestServer::with_defaults().await;

    let response = http()
        .post_json(&server.url("/message"), b"{}".to_vec(), None)
        .await?;
    assert_eq!(response.status, 503);
    assert_eq!(error_of(&response), "No workers available");

    let via_caller = server.caller().call(&json!({}), None).await;
    assert!(matches!(via_caller, Err(CallError::NoWorkers)));
    Ok(())
}

#[tokio::test]
async fn missing_session_id_is_bad_request() -> TestResult {
    let server = TestServer::with_defaults().await;

    let polled = http().get(&server.url("/poll"), None).await?;
    assert_eq!(polled.status, 400);
    assert_eq!(error_of(&polled), "Missing session_id");

    let responded = http()
        .post_json(&server.url("/response"), b"{}".to_vec(), None)
        .await?;
    assert_eq!(responded.status, 400);
    Ok(())
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() -> TestResult {
    let server = TestServer::with_defaults().await;
    let session_id = server.register().await.to_hex();

    let register = http()
        .post_json(&server.url("/register"), b"not json".to_vec(), None)
        .await?;
    assert_eq!(register.status, 400);
    assert_eq!(error_of(&register), "Invalid request");

    let not_object = http()
        .post_json(&server.url("/register"), b"42".to_vec(), None)
        .await?;
    assert_eq!(not_object.status, 400);

    let response = server
        .respond(&session_id, br#"{"request_id":"0000000000000001"}"#.to_vec())
        .await;
    assert_eq!(response.status, 400);
    assert_eq!(error_of(&response), "Invalid response format");

    let message = http()
        .post_json(&server.url("/message"), b"{oops".to_vec(), None)
        .await?;
    assert_eq!(message.status, 400);
    Ok(())
}

#[tokio::test]
async fn stopped_worker_leaves_calls_queued() -> TestResult {
    let server = TestServer::start(
        RelayServerBuilder::new()
            .poll_timeout(POLL_TIMEOUT)
            .call_timeout(Duration::from_millis(500)),
    )
    .await;
    let worker = worker(&server, "alpha");
    worker.start(StartMode::Background).await?;
    let session_id = worker.session_id().await.expect("registered").to_hex();
    worker.stop().await;
    assert!(!worker.is_running());

    // Let any poll the worker left behind run out its budget.
    tokio::time::sleep(POLL_TIMEOUT * 2).await;

    let result = server.caller().call(&json!({"queued": true}), None).await;
    assert!(matches!(result, Err(CallError::Timeout)));

    // Nobody took it; the next poll on the session still gets it.
    let polled = server.poll(&session_id).await;
    assert_eq!(polled.status, 200);
    let PollResponse { request, .. } = serde_json::from_slice(&polled.body)?;
    assert_eq!(request, json!({"queued": true}));
    Ok(())
}

#[tokio::test]
async fn handler_error_reaches_caller_without_timeout() -> TestResult {
    let server = TestServer::with_defaults().await;
    let worker = ReverseClient::new(
        server.base_url(),
        http(),
        handler_fn(|_call: IncomingCall| async move {
            Err::<Value, _>(HandlerError::new("division by zero"))
        }),
        ClientOptions {
            poll_timeout: POLL_TIMEOUT,
            ..ClientOptions::default()
        },
    );
    worker.start(StartMode::Background).await?;

    let started = Instant::now();
    let result = server
        .caller()
        .call(&json!({"operation": "divide", "a": 1, "b": 0}), None)
        .await?;

    assert_eq!(result, json!({"error": "division by zero"}));
    assert!(started.elapsed() < CALL_TIMEOUT);

    // The loop did not back off: the next call is answered just as fast.
    let started = Instant::now();
    server.caller().call(&json!("again"), None).await?;
    assert!(started.elapsed() < CALL_TIMEOUT);

    worker.stop().await;
    Ok(())
}

#[tokio::test]
async fn malformed_request_id_is_accepted_and_discarded() -> TestResult {
    let server = TestServer::with_defaults().await;
    let session_id = server.register().await.to_hex();

    let body = serde_json::to_vec(&json!({"request_id": "stale-id-xyz", "response": 1}))?;
    let ack = server.respond(&session_id, body).await;
    assert_eq!(ack.status, 200);
    assert_eq!(serde_json::from_slice::<Ack>(&ack.body)?, Ack::ok());

    // The session is untouched and keeps serving polls.
    let polled = server.poll(&session_id).await;
    assert_eq!(polled.status, 204);
    Ok(())
}
