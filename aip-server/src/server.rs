//! HTTP surface of an AIP provider.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use aip_core::manifest::{BIND_PATH, DISCOVERY_PATH, INTAKE_PATH_PREFIX};
use aip_core::{AipError, AipResponse, AipResult, ErrorResponse};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::engine::{BindOutcome, ProviderEngine};

type SharedEngine = Arc<ProviderEngine>;

/// AIP Server.
pub struct Server {
    config: ServerConfig,
    engine: SharedEngine,
}

impl Server {
    /// Create a new server.
    pub fn new(config: ServerConfig, engine: SharedEngine) -> Self {
        Self { config, engine }
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.engine), self.config.max_body_size)
    }

    /// Bind the configured address and serve until the process stops.
    pub async fn run(self) -> AipResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| AipError::Transport(format!("Failed to bind: {}", e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> AipResult<()> {
        let addr = listener
            .local_addr()
            .map_err(|e| AipError::Transport(format!("Failed to read local address: {}", e)))?;
        tracing::info!("AIP server listening on {}", addr);
        tracing::info!("Registered intakes: {:?}", self.engine.intake_ids());

        let sweeper = spawn_sweeper(Arc::clone(&self.engine), self.config.sweep_interval);
        let result = axum::serve(listener, self.router())
            .await
            .map_err(|e| AipError::Transport(format!("Server error: {}", e)));
        sweeper.abort();
        result
    }
}

/// Periodically purge offers nobody came back for.
fn spawn_sweeper(engine: SharedEngine, every: StdDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(StdDuration::from_secs(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            engine.purge_expired();
        }
    })
}

/// Build the provider router.
pub fn router(engine: SharedEngine, max_body_size: usize) -> Router {
    let intake_path = format!("{}/:intake_id", INTAKE_PATH_PREFIX);

    Router::new()
        .route(DISCOVERY_PATH, get(discovery).fallback(not_found))
        .route(BIND_PATH, post(bind).fallback(not_found))
        .route(&intake_path, post(submit).fallback(not_found))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn cors(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Read a JSON body. Oversized or unreadable bodies become `INVALID_INPUT`.
fn parse_body(body: Result<Bytes, BytesRejection>) -> AipResult<Value> {
    let body = body.map_err(|rejection| {
        tracing::warn!(error = %rejection, "request body rejected");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AipError::InvalidInput("Request body too large".to_string())
        } else {
            AipError::InvalidInput("Unreadable request body".to_string())
        }
    })?;
    serde_json::from_slice(&body).map_err(|_| AipError::InvalidInput("Invalid JSON body".to_string()))
}

async fn discovery(State(engine): State<SharedEngine>) -> Response {
    match engine.manifest() {
        Ok(manifest) => Json(manifest).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to build manifest");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.public_message() })),
            )
                .into_response()
        }
    }
}

async fn submit(
    State(engine): State<SharedEngine>,
    Path(intake_id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let response = match parse_body(body) {
        Ok(value) => engine.submit(&intake_id, value).await,
        Err(err) => AipResponse::Error(ErrorResponse::from_error(engine.aip_version(), None, &err)),
    };
    (status(response.http_status()), Json(response)).into_response()
}

async fn bind(State(engine): State<SharedEngine>, body: Result<Bytes, BytesRejection>) -> Response {
    let outcome = match parse_body(body) {
        Ok(value) => engine.bind(value).await,
        Err(err) => BindOutcome::Rejected(ErrorResponse::from_error(engine.aip_version(), None, &err)),
    };

    let code = status(outcome.http_status());
    match outcome {
        BindOutcome::Bound(result) => (code, Json(result)).into_response(),
        BindOutcome::Rejected(err) => (code, Json(AipResponse::Error(err))).into_response(),
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}
