//! Purpose: End-to-end tests for the HTTP gateway routes.
//! Exports: None (integration test module).
//! Role: Validate /parse, /drivers, /gist and the error envelope across TCP.
//! Invariants: Uses a loopback server on an ephemeral port with an in-process fake backend.
//! Invariants: Per-request backend clients are counted so leaks fail the test.

use serde_json::{Value, json};
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uast_gateway::api::{
    AppState, BackendRequest, BackendStatus, Connector, Error, ErrorKind, GrpcBackend,
    GrpcConnector, ParseBackend, ParseOutcome, Role, ServeConfig, SyntaxNode, router,
};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Default)]
struct Counters {
    default_calls: AtomicUsize,
    opened: AtomicUsize,
    released: AtomicUsize,
}

impl Counters {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn default_calls(&self) -> usize {
        self.default_calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct FakeBackend {
    counters: Arc<Counters>,
    owned: bool,
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        if self.owned {
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl ParseBackend for FakeBackend {
    async fn parse(&self, request: BackendRequest) -> Result<ParseOutcome, Error> {
        if !self.owned {
            self.counters.default_calls.fetch_add(1, Ordering::SeqCst);
        }
        scripted_outcome(&request)
    }
}

struct FakeConnector {
    counters: Arc<Counters>,
}

impl Connector for FakeConnector {
    type Client = FakeBackend;

    async fn connect(&self, address: &str) -> Result<FakeBackend, Error> {
        if address.starts_with("unreachable") {
            return Err(Error::new(ErrorKind::Connect)
                .with_message(format!("failed to connect to backend at {address}")));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeBackend {
            counters: self.counters.clone(),
            owned: true,
        })
    }
}

fn module_tree() -> SyntaxNode {
    SyntaxNode::new("Module").with_child(SyntaxNode::new("Assign").with_roles([Role::Expression]))
}

fn scripted_outcome(request: &BackendRequest) -> Result<ParseOutcome, Error> {
    match request.content.as_str() {
        "x = 1" => Ok(ParseOutcome::new(
            BackendStatus::Ok,
            Some(module_tree()),
            Vec::new(),
        )),
        "x = " => Ok(ParseOutcome::new(
            BackendStatus::ParseError,
            Some(SyntaxNode::new("Module")),
            vec!["unexpected EOF".to_string()],
        )),
        "crash" => Ok(ParseOutcome::new(
            BackendStatus::Fatal,
            None,
            vec!["driver crashed".to_string()],
        )),
        _ => Err(Error::new(ErrorKind::Invocation).with_message("backend unavailable")),
    }
}

struct TestServer {
    base_url: String,
    counters: Arc<Counters>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start() -> TestResult<Self> {
        Self::start_with(|_| {}).await
    }

    async fn start_with(configure: impl FnOnce(&mut ServeConfig)) -> TestResult<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let mut config = ServeConfig::new(addr, "127.0.0.1:9432");
        configure(&mut config);

        let counters = Arc::new(Counters::default());
        let default = FakeBackend {
            counters: counters.clone(),
            owned: false,
        };
        let connector = FakeConnector {
            counters: counters.clone(),
        };
        let app = router(AppState::new(default, connector, &config)?, &config)?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self {
            base_url: format!("http://{addr}"),
            counters,
            handle,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Reply {
    status: u16,
    raw: Vec<u8>,
    body: String,
    allow_origin: Option<String>,
}

impl Reply {
    fn json(&self) -> TestResult<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

fn into_reply(result: Result<ureq::Response, ureq::Error>) -> Result<Reply, String> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => return Err(err.to_string()),
    };
    let status = response.status();
    let allow_origin = response
        .header("access-control-allow-origin")
        .map(str::to_string);
    let mut raw = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut raw)
        .map_err(|err| err.to_string())?;
    let body = String::from_utf8_lossy(&raw).into_owned();
    Ok(Reply {
        status,
        raw,
        body,
        allow_origin,
    })
}

async fn post_raw(url: String, body: String) -> TestResult<Reply> {
    let reply = tokio::task::spawn_blocking(move || {
        into_reply(
            ureq::post(&url)
                .set("content-type", "application/json")
                .send_string(&body),
        )
    })
    .await??;
    Ok(reply)
}

async fn post_json(url: String, body: Value) -> TestResult<Reply> {
    post_raw(url, body.to_string()).await
}

async fn get(url: String, origin: Option<&'static str>) -> TestResult<Reply> {
    let reply = tokio::task::spawn_blocking(move || {
        let mut request = ureq::get(&url).timeout(Duration::from_secs(20));
        if let Some(origin) = origin {
            request = request.set("origin", origin);
        }
        into_reply(request.call())
    })
    .await??;
    Ok(reply)
}

fn first_error_message(value: &Value) -> String {
    value["errors"][0]["message"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn parse_with_default_backend_returns_encoded_tree() -> TestResult<()> {
    let server = TestServer::start().await?;
    let reply = post_json(
        server.url("/parse"),
        json!({"language": "python", "content": "x = 1"}),
    )
    .await?;

    assert_eq!(reply.status, 200);
    assert_eq!(
        reply.json()?,
        json!({
            "status": "ok",
            "errors": [],
            "uast": {
                "kind": "Module",
                "roles": [],
                "children": [{"kind": "Assign", "roles": ["Expression"], "children": []}]
            }
        })
    );
    assert_eq!(server.counters.default_calls(), 1);
    assert_eq!(server.counters.opened(), 0);
    assert_eq!(server.counters.released(), 0);
    Ok(())
}

#[tokio::test]
async fn malformed_json_is_a_decode_error() -> TestResult<()> {
    let server = TestServer::start().await?;
    let reply = post_raw(server.url("/parse"), "{\"language\": ".to_string()).await?;

    assert_eq!(reply.status, 400);
    let value = reply.json()?;
    assert_eq!(value["status"], "fatal");
    assert!(first_error_message(&value).starts_with("unable to read request: "));
    assert_eq!(server.counters.default_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn oversized_body_gets_the_error_envelope() -> TestResult<()> {
    let server = TestServer::start_with(|config| {
        config.max_body_bytes = 64;
    })
    .await?;
    let content = "x".repeat(200);
    let reply = post_json(
        server.url("/parse"),
        json!({"language": "python", "content": content}),
    )
    .await?;

    assert_eq!(reply.status, 413);
    let value = reply.json()?;
    assert_eq!(value["status"], "fatal");
    assert!(first_error_message(&value).starts_with("unable to read request: "));
    assert_eq!(server.counters.default_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn missing_content_is_a_decode_error() -> TestResult<()> {
    let server = TestServer::start().await?;
    let reply = post_json(server.url("/parse"), json!({"language": "python"})).await?;

    assert_eq!(reply.status, 400);
    let message = first_error_message(&reply.json()?);
    assert!(message.contains("content"), "unexpected message: {message}");
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_is_a_server_error_without_leaks() -> TestResult<()> {
    let server = TestServer::start().await?;
    let reply = post_json(
        server.url("/parse"),
        json!({"backendAddress": "unreachable:9999", "language": "python", "content": "x = 1"}),
    )
    .await?;

    assert_eq!(reply.status, 500);
    let value = reply.json()?;
    assert_eq!(value["status"], "fatal");
    let message = first_error_message(&value);
    assert!(message.starts_with("error starting client: "));
    assert!(message.contains("unreachable:9999"));
    assert_eq!(server.counters.opened(), server.counters.released());
    assert_eq!(server.counters.default_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn explicit_backend_is_opened_and_released_per_request() -> TestResult<()> {
    let server = TestServer::start().await?;
    for _ in 0..3 {
        let reply = post_json(
            server.url("/parse"),
            json!({"backendAddress": "10.1.2.3:9432", "language": "python", "content": "x = 1"}),
        )
        .await?;
        assert_eq!(reply.status, 200);
    }

    assert_eq!(server.counters.opened(), 3);
    assert_eq!(server.counters.released(), 3);
    assert_eq!(server.counters.default_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn legacy_server_url_key_selects_backend() -> TestResult<()> {
    let server = TestServer::start().await?;
    let reply = post_json(
        server.url("/parse"),
        json!({"server_url": "10.1.2.3:9432", "language": "python", "content": "x = 1"}),
    )
    .await?;

    assert_eq!(reply.status, 200);
    assert_eq!(server.counters.opened(), 1);
    assert_eq!(server.counters.released(), 1);
    Ok(())
}

#[tokio::test]
async fn backend_parse_error_maps_to_bad_request_with_partial_tree() -> TestResult<()> {
    let server = TestServer::start().await?;
    let reply = post_json(
        server.url("/parse"),
        json!({"language": "python", "content": "x = "}),
    )
    .await?;

    assert_eq!(reply.status, 400);
    assert_eq!(
        reply.json()?,
        json!({
            "status": "error",
            "errors": [{"message": "unexpected EOF"}],
            "uast": {"kind": "Module", "roles": [], "children": []}
        })
    );
    Ok(())
}

#[tokio::test]
async fn backend_fatal_maps_to_server_error_with_null_tree() -> TestResult<()> {
    let server = TestServer::start().await?;
    let reply = post_json(
        server.url("/parse"),
        json!({"language": "python", "content": "crash"}),
    )
    .await?;

    assert_eq!(reply.status, 500);
    assert_eq!(
        reply.json()?,
        json!({
            "status": "fatal",
            "errors": [{"message": "driver crashed"}],
            "uast": null
        })
    );
    Ok(())
}

#[tokio::test]
async fn rpc_failure_releases_ephemeral_client() -> TestResult<()> {
    let server = TestServer::start().await?;
    let reply = post_json(
        server.url("/parse"),
        json!({"backendAddress": "10.1.2.3:9432", "language": "python", "content": "boom"}),
    )
    .await?;

    assert_eq!(reply.status, 500);
    let value = reply.json()?;
    assert_eq!(value["status"], "fatal");
    assert_eq!(
        first_error_message(&value),
        "error parsing UAST: backend unavailable"
    );
    assert_eq!(server.counters.opened(), 1);
    assert_eq!(server.counters.released(), 1);
    Ok(())
}

#[tokio::test]
async fn drivers_lists_configured_languages() -> TestResult<()> {
    let server = TestServer::start_with(|config| {
        config.drivers = vec!["python".to_string(), "go".to_string()];
    })
    .await?;
    let reply = get(server.url("/drivers"), None).await?;

    assert_eq!(reply.status, 200);
    assert_eq!(reply.json()?, json!(["python", "go"]));
    Ok(())
}

#[tokio::test]
async fn healthz_reports_ok() -> TestResult<()> {
    let server = TestServer::start().await?;
    let reply = get(server.url("/healthz"), None).await?;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.json()?, json!({"ok": true}));
    Ok(())
}

#[tokio::test]
async fn cors_origin_is_echoed_when_allowed() -> TestResult<()> {
    let server = TestServer::start_with(|config| {
        config.cors_allowed_origins = vec!["http://ui.example".to_string()];
    })
    .await?;

    let allowed = get(server.url("/drivers"), Some("http://ui.example")).await?;
    assert_eq!(allowed.allow_origin.as_deref(), Some("http://ui.example"));

    let denied = get(server.url("/drivers"), Some("http://other.example")).await?;
    assert_eq!(denied.allow_origin, None);
    Ok(())
}

async fn start_gist_origin() -> TestResult<(String, tokio::task::JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = axum::Router::new()
        .route(
            "/someone/abc123/raw/snippet.py",
            axum::routing::get(|| async { "print('hi')\n" }),
        )
        .route(
            "/someone/abc123/raw/latin1.txt",
            axum::routing::get(|| async { vec![b'c', b'a', b'f', 0xe9, 0xff, 0x00] }),
        );
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/"), handle))
}

#[tokio::test]
async fn gist_passthrough_returns_remote_body_and_status() -> TestResult<()> {
    let (origin, origin_handle) = start_gist_origin().await?;
    let server = TestServer::start_with(move |config| {
        config.gist_base_url = origin;
    })
    .await?;

    let found = get(server.url("/gist?url=someone/abc123/raw/snippet.py"), None).await?;
    assert_eq!(found.status, 200);
    assert_eq!(found.body, "print('hi')\n");

    let missing = get(server.url("/gist?url=someone/missing"), None).await?;
    assert_eq!(missing.status, 404);

    let binary = get(server.url("/gist?url=someone/abc123/raw/latin1.txt"), None).await?;
    assert_eq!(binary.status, 200);
    assert_eq!(binary.raw, vec![b'c', b'a', b'f', 0xe9, 0xff, 0x00]);

    origin_handle.abort();
    Ok(())
}

#[tokio::test]
async fn gist_transport_failure_is_not_found() -> TestResult<()> {
    let server = TestServer::start_with(|config| {
        config.gist_base_url = "http://127.0.0.1:1/".to_string();
    })
    .await?;

    let reply = get(server.url("/gist?url=someone/abc123/raw"), None).await?;
    assert_eq!(reply.status, 404);
    let value = reply.json()?;
    assert_eq!(value["status"], "fatal");
    assert!(first_error_message(&value).starts_with("Gist not found: "));
    Ok(())
}

#[tokio::test]
async fn gist_without_url_is_a_bad_request() -> TestResult<()> {
    let server = TestServer::start().await?;
    let reply = get(server.url("/gist"), None).await?;
    assert_eq!(reply.status, 400);
    assert_eq!(reply.json()?["status"], "fatal");
    Ok(())
}

#[tokio::test]
async fn grpc_connector_reports_unresolvable_backend() -> TestResult<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let config = ServeConfig::new(addr, "127.0.0.1:1");
    let state = AppState::new(
        GrpcBackend::lazy(&config.backend_address)?,
        GrpcConnector::default().with_connect_timeout(Duration::from_secs(2)),
        &config,
    )?;
    let app = router(state, &config)?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let reply = post_json(
        format!("http://{addr}/parse"),
        json!({"backendAddress": "unreachable:9999", "language": "python", "content": "x = 1"}),
    )
    .await?;
    handle.abort();

    assert_eq!(reply.status, 500);
    let value = reply.json()?;
    assert_eq!(value["status"], "fatal");
    let message = first_error_message(&value);
    assert!(message.starts_with("error starting client: "));
    assert!(message.contains("unreachable:9999"));
    Ok(())
}
