//! Purpose: Provide the HTTP/JSON gateway in front of a UAST parsing backend.
//! Exports: `ServeConfig`, `AppState`, `router`, `serve`, `validate_config`.
//! Role: Axum server; `/parse` resolves a backend client, calls it, and encodes the tree.
//! Invariants: Every failure is answered with the `{status: "fatal", errors}` envelope.
//! Invariants: Per-request backend clients are released before the handler returns.
//! Invariants: Dropping a handler future (client disconnect) abandons the backend call.
use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::backend::grpc::{GrpcBackend, GrpcConnector, normalize_address};
use crate::backend::router::resolve;
use crate::backend::{BackendRequest, Connector, ParseOutcome};
use crate::core::encode::{encode, write_document};
use crate::core::error::{Error, ErrorKind, to_http_status};
use crate::gist::{DEFAULT_GIST_BASE_URL, GistSource};

pub const DEFAULT_BIND: &str = "127.0.0.1:9999";
pub const DEFAULT_BACKEND: &str = "127.0.0.1:9432";
pub const DEFAULT_MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;
pub const DEFAULT_DRIVERS: &[&str] = &[
    "bash",
    "csharp",
    "go",
    "java",
    "javascript",
    "php",
    "python",
    "ruby",
    "typescript",
];

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub backend_address: String,
    pub drivers: Vec<String>,
    pub gist_base_url: String,
    pub cors_allowed_origins: Vec<String>,
    pub max_body_bytes: u64,
    pub parse_timeout_ms: Option<u64>,
}

impl ServeConfig {
    pub fn new(bind: SocketAddr, backend_address: impl Into<String>) -> Self {
        Self {
            bind,
            backend_address: backend_address.into(),
            drivers: DEFAULT_DRIVERS.iter().map(|id| id.to_string()).collect(),
            gist_base_url: DEFAULT_GIST_BASE_URL.to_string(),
            cors_allowed_origins: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            parse_timeout_ms: None,
        }
    }
}

/// Shared, read-only state for every request.
pub struct AppState<K: Connector> {
    default_client: K::Client,
    connector: K,
    drivers: Vec<String>,
    gist: GistSource,
    parse_timeout: Option<Duration>,
}

impl<K: Connector> AppState<K> {
    pub fn new(
        default_client: K::Client,
        connector: K,
        config: &ServeConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            default_client,
            connector,
            drivers: config.drivers.clone(),
            gist: GistSource::new(&config.gist_base_url)?,
            parse_timeout: config.parse_timeout_ms.map(Duration::from_millis),
        })
    }
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let default_client = GrpcBackend::lazy(&config.backend_address)?;
    let state = AppState::new(default_client, GrpcConnector::default(), &config)?;
    let app = router(state, &config)?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(
        bind = %config.bind,
        backend = %config.backend_address,
        "uast gateway listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

/// Builds the gateway routes over `state`. Tests mount this with a fake connector.
pub fn router<K: Connector>(state: AppState<K>, config: &ServeConfig) -> Result<Router, Error> {
    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;
    let cors = cors_layer(&config.cors_allowed_origins)?;

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/parse", post(parse::<K>))
        .route("/drivers", get(drivers::<K>))
        .route("/gist", get(gist::<K>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state));
    Ok(match cors {
        Some(cors) => app.layer(cors),
        None => app,
    })
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    normalize_address(&config.backend_address).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid --backend: {}", err.detail()))
            .with_hint("Use host:port or http://host:port, e.g. 127.0.0.1:9432.")
    })?;

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 4194304."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    if config.parse_timeout_ms == Some(0) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--parse-timeout-ms must be greater than zero")
            .with_hint("Omit the flag to rely on client cancellation only."));
    }

    if config.drivers.iter().any(|driver| driver.trim().is_empty()) {
        return Err(Error::new(ErrorKind::Usage).with_message("--driver values must not be empty"));
    }

    GistSource::new(&config.gist_base_url)?;
    cors_layer(&config.cors_allowed_origins)?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> Result<Option<CorsLayer>, Error> {
    if origins.is_empty() {
        return Ok(None);
    }
    let mut values = Vec::with_capacity(origins.len());
    for origin in origins {
        let value = HeaderValue::from_str(origin).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid --cors-origin {origin:?}"))
                .with_source(err)
        })?;
        values.push(value);
    }
    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(values))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]),
    ))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Deserialize)]
struct ParseRequest {
    #[serde(default, rename = "backendAddress", alias = "server_url")]
    backend_address: String,
    #[serde(default)]
    language: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GistQuery {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorMessage {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    status: &'static str,
    errors: Vec<ErrorMessage>,
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn parse<K: Connector>(
    State(state): State<Arc<AppState<K>>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let err = Error::new(ErrorKind::Decode)
                .with_message(format!("unable to read request: {}", rejection.body_text()));
            return envelope(rejection.status(), &err);
        }
    };
    let request: ParseRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(
                &Error::new(ErrorKind::Decode)
                    .with_message("unable to read request")
                    .with_source(err),
            );
        }
    };

    let client = match resolve(&request.backend_address, &state.default_client, &state.connector)
        .await
    {
        Ok(client) => client,
        Err(err) => return error_response(&err.with_context("error starting client")),
    };

    let result = client
        .parse(BackendRequest {
            language: request.language,
            content: request.content,
            timeout: state.parse_timeout,
        })
        .await;
    drop(client);

    match result {
        Ok(outcome) => parse_response(&outcome),
        Err(err) => {
            tracing::error!(
                backend = %request.backend_address,
                error = %err.detail(),
                "parse call failed"
            );
            error_response(&err.with_context("error parsing UAST"))
        }
    }
}

async fn drivers<K: Connector>(State(state): State<Arc<AppState<K>>>) -> Response {
    Json(state.drivers.clone()).into_response()
}

async fn gist<K: Connector>(
    State(state): State<Arc<AppState<K>>>,
    Query(query): Query<GistQuery>,
) -> Response {
    let Some(path) = query.url.filter(|path| !path.trim().is_empty()) else {
        return error_response(
            &Error::new(ErrorKind::Usage).with_message("missing gist url query parameter"),
        );
    };
    let source = state.gist.clone();
    let result = tokio::task::spawn_blocking(move || source.fetch(&path)).await;
    let fetched = match result {
        Ok(fetched) => fetched,
        Err(err) => Err(Error::new(ErrorKind::Internal)
            .with_message("gist fetch task failed")
            .with_source(err)),
    };
    match fetched {
        Ok(gist) => {
            let status = StatusCode::from_u16(gist.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                gist.body,
            )
                .into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err.detail(), "gist fetch failed");
            error_response(&err)
        }
    }
}

fn parse_response(outcome: &ParseOutcome) -> Response {
    let status = StatusCode::from_u16(outcome.status().http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = Vec::new();
    match write_parse_body(outcome, &mut body) {
        Ok(()) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(err) => error_response(
            &Error::new(ErrorKind::Internal)
                .with_message("failed to write response")
                .with_source(err),
        ),
    }
}

/// `{status, errors, language?, elapsed?, uast}`. `elapsed` is in nanoseconds.
/// The tree goes through the encoder's writer so its depth never reaches serde.
fn write_parse_body(outcome: &ParseOutcome, out: &mut Vec<u8>) -> io::Result<()> {
    let errors: Vec<ErrorMessage> = outcome
        .diagnostics()
        .iter()
        .map(|message| ErrorMessage {
            message: message.clone(),
        })
        .collect();
    out.extend_from_slice(b"{\"status\":");
    serde_json::to_writer(&mut *out, outcome.status().as_str())?;
    out.extend_from_slice(b",\"errors\":");
    serde_json::to_writer(&mut *out, &errors)?;
    if !outcome.language().is_empty() {
        out.extend_from_slice(b",\"language\":");
        serde_json::to_writer(&mut *out, outcome.language())?;
    }
    if let Some(elapsed) = outcome.elapsed() {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        out.extend_from_slice(b",\"elapsed\":");
        serde_json::to_writer(&mut *out, &nanos)?;
    }
    out.extend_from_slice(b",\"uast\":");
    write_document(encode(outcome.tree()).as_ref(), out)?;
    out.push(b'}');
    Ok(())
}

fn error_response(err: &Error) -> Response {
    let status =
        StatusCode::from_u16(to_http_status(err.kind())).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    envelope(status, err)
}

fn envelope(status: StatusCode, err: &Error) -> Response {
    let body = ErrorEnvelope {
        status: "fatal",
        errors: vec![ErrorMessage {
            message: err.detail(),
        }],
    };
    (status, Json(body)).into_response()
}
