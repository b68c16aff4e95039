//! Router, shared state and the listener loop.
//!
//! [`app_router`] wires the three routes to a shared [`AppState`] with
//! permissive CORS and request tracing. [`run_server`] binds
//! [`ServerConfig`]'s address and serves until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use medrag_core::{HealthStatus, QueryResponse, RetrievalService};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ApiError;

/// Port used when neither the caller nor `PORT` picks one.
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RetrievalService>,
}

impl AppState {
    pub fn new(service: RetrievalService) -> Self {
        Self { service: Arc::new(service) }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: DEFAULT_PORT }
    }
}

impl ServerConfig {
    /// Defaults, with the port taken from `PORT` when it is set and valid.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT);
        Self { port, ..Self::default() }
    }
}

/// Body of `POST /query`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    /// Number of results; the service default when absent.
    #[serde(default)]
    pub k: Option<usize>,
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/query", post(query))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve `service` until Ctrl-C.
pub async fn run_server(config: ServerConfig, service: RetrievalService) -> anyhow::Result<()> {
    let app = app_router(AppState::new(service));
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid host/port {}:{}", config.host, config.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("medrag listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("medrag server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "online",
        "message": "Medical reference retrieval API",
        "version": env!("CARGO_PKG_VERSION"),
        "vector_count": state.service.len(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.service.health())
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    debug!(question_len = request.question.len(), k = ?request.k, "query received");
    let response = state.service.query(&request.question, request.k).await?;
    Ok(Json(response))
}
