//! HTTP gateway
//!
//! Exposes the runner and judge over JSON. Protected routes require the
//! shared API key and are rate limited per caller; panics in handlers are
//! turned into an `INTERNAL_ERROR` response.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use crate::gateway::rate_limit::RateLimiter;
pub use crate::gateway::wire::TestCasePayload;
use crate::config::ServerConfig;
use crate::gateway::wire::ErrorBody;
use crate::runner::Runner;

pub mod auth;
mod handlers;
pub mod rate_limit;
pub mod wire;

/// Errors that stop the server
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Error response of a handler or middleware
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Generic envelope for engine faults; details stay in the logs
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Internal error",
        )
    }

    pub fn from_rejection(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                "Request body too large",
            )
        } else {
            Self::bad_request(rejection.body_text())
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            status: self.code,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// State shared by all handlers
#[derive(Debug)]
pub struct AppState {
    pub(crate) runner: Runner,
    pub(crate) limiter: RateLimiter,
    pub(crate) api_key: Option<String>,
    pub(crate) trust_forwarded_for: bool,
    pub(crate) started: Instant,
}

impl AppState {
    pub fn new(runner: Runner) -> Self {
        let server = &runner.config().server;
        let limiter = RateLimiter::new(
            server.rate_limit_requests,
            Duration::from_secs(server.rate_limit_window_secs),
        );
        let api_key = server.api_key.clone().filter(|key| !key.is_empty());
        let trust_forwarded_for = server.trust_forwarded_for;
        Self {
            runner,
            limiter,
            api_key,
            trust_forwarded_for,
            started: Instant::now(),
        }
    }
}

/// Build the application router
pub fn router(runner: Runner) -> Router {
    let server = runner.config().server.clone();
    let state = Arc::new(AppState::new(runner));
    if state.api_key.is_none() {
        warn!("no api key configured, authentication is disabled");
    }

    let protected = Router::new()
        .route("/languages", get(handlers::languages))
        .route("/execute", post(handlers::execute))
        .route("/judge", post(handlers::judge))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_requests,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state);

    with_layers(app, &server)
}

fn with_layers(router: Router, server: &ServerConfig) -> Router {
    router
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(panic = detail, "handler panicked");
    ApiError::internal().into_response()
}

/// Bind the configured address and serve until shutdown
pub async fn serve(runner: Runner) -> Result<(), GatewayError> {
    let addr = runner.config().server.bind.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: addr.clone(),
            source,
        })?;
    serve_on(listener, runner).await
}

/// Serve on an already bound listener until ctrl-c or SIGTERM
///
/// Also runs the orphaned workspace sweep for the lifetime of the server.
pub async fn serve_on(listener: TcpListener, runner: Runner) -> Result<(), GatewayError> {
    let interval = Duration::from_secs(runner.config().sweep.interval_secs);
    let sweeper = runner.workspaces().spawn_sweeper(interval);
    let languages = runner.config().languages.len();
    let app = router(runner);

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, languages, "gateway listening");
    }

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    sweeper.abort();
    info!("gateway stopped");
    result.map_err(GatewayError::Serve)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
