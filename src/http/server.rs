//! HTTP server setup and the bridge handler.
//!
//! # Responsibilities
//! - Create the Axum Router shared by the CGI adapter and `serve` mode
//! - Wire up middleware (tracing)
//! - Run the per-request pipeline: reachability → rewrite → forward | relay
//! - Bind the standalone server to a listener with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::backend::{self, BackendTarget};
use crate::http::error::BridgeError;
use crate::http::rewrite::rewrite;
use crate::http::{forward, websocket};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub target: Arc<BackendTarget>,
}

/// Build the catch-all router that bridges every request to the backend.
pub fn build_router(target: Arc<BackendTarget>) -> Router {
    let state = AppState { target };
    Router::new()
        .route("/{*path}", any(bridge_handler))
        .route("/", any(bridge_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Standalone HTTP server for the bridge.
pub struct HttpServer {
    router: Router,
    target: Arc<BackendTarget>,
}

impl HttpServer {
    /// Create a new HTTP server bridging to `target`.
    pub fn new(target: BackendTarget) -> Self {
        let target = Arc::new(target);
        let router = build_router(target.clone());
        Self { router, target }
    }

    /// Run the server, accepting connections on the given listener until
    /// the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            socket = %self.target.socket_path.display(),
            base_path = self.target.base_path.as_str(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main bridge handler.
async fn bridge_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let span = tracing::info_span!(
        "bridge",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        match handle(&state.target, request).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }
    .instrument(span)
    .await
}

/// Bridge one request to the backend.
pub async fn handle(target: &BackendTarget, request: Request<Body>) -> Result<Response, BridgeError> {
    backend::ensure_reachable(&target.socket_path)?;

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let (parts, body) = request.into_parts();
    let rewritten = rewrite(&parts, remote, &target.base_path);

    tracing::debug!(
        backend_url = %rewritten.url(),
        upgrade = rewritten.is_upgrade(),
        "Request rewritten"
    );

    if rewritten.is_upgrade() {
        websocket::bridge(target, rewritten, parts).await
    } else {
        forward::forward(target, rewritten, body).await
    }
}
