//! Purpose: Local HTTP adapter that runs the handler behind real HTTP requests.
//! Exports: `ServeConfig`, `serve`, `init_tracing`.
//! Role: Axum server exposing the envelope both API-Gateway style and Lambda-invoke style.
//! Invariants: `GET /records` maps envelope status/headers/body onto the HTTP response.
//! Invariants: The invoke route returns the envelope itself as JSON, like the runtime emulator.
//! Invariants: Loopback-only unless explicitly allowed.

use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::backend::Backend;
use recordscan::api::{
    Error, ErrorKind, Invocation, InvocationContext, RecordsHandler, ResponseEnvelope,
};

pub const INVOKE_PATH: &str = "/2015-03-31/functions/function/invocations";

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub allow_non_loopback: bool,
}

struct AppState {
    handler: RecordsHandler<Backend>,
    invocations: std::sync::atomic::AtomicU64,
}

impl AppState {
    fn next_request_id(&self) -> String {
        let seq = self
            .invocations
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("local-{seq}")
    }
}

pub async fn serve(config: ServeConfig, handler: RecordsHandler<Backend>) -> Result<(), Error> {
    validate_config(&config)?;

    let state = Arc::new(AppState {
        handler,
        invocations: std::sync::atomic::AtomicU64::new(0),
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/records", get(records))
        .route(INVOKE_PATH, post(invoke))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    info!(bind = %config.bind, "serving records");

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

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }
    Ok(())
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
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
                warn!(error = %err, "failed to install SIGTERM handler");
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

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn records(State(state): State<Arc<AppState>>) -> Response {
    let context = InvocationContext::local(state.next_request_id());
    let envelope = state
        .handler
        .handle(&Invocation::new(Value::Null, context))
        .await;
    envelope_response(envelope)
}

async fn invoke(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let event = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    let context = InvocationContext::local(state.next_request_id());
    let envelope = state.handler.handle(&Invocation::new(event, context)).await;
    Json(envelope).into_response()
}

fn envelope_response(envelope: ResponseEnvelope) -> Response {
    let status = StatusCode::from_u16(envelope.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::new(Body::from(envelope.body));
    *response.status_mut() = status;
    for (name, value) in &envelope.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            warn!(header = %name, "dropping header that is not valid http");
            continue;
        };
        response.headers_mut().insert(name, value);
    }
    response
}
