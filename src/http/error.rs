//! Request failure taxonomy.
//!
//! Every variant surfaces to the caller the same way: a bare
//! `500 Internal Server Error` with an empty body. The detail only reaches
//! the log.

use std::path::PathBuf;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The backend socket is missing or cannot be stat'ed.
    #[error("backend socket {path} is unavailable: {source}")]
    BackendUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The socket exists but dialing it failed.
    #[error("failed to connect to backend socket {path}: {source}")]
    BackendConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend did not produce a response.
    #[error("backend request failed: {0}")]
    BackendRequest(#[from] hyper::Error),

    /// The backend answered a WebSocket handshake without switching protocols.
    #[error("backend refused websocket handshake with status {0}")]
    BackendRejected(StatusCode),

    /// The backend's 101 response was not a valid WebSocket handshake.
    #[error("backend websocket handshake failed: {0}")]
    BackendHandshake(#[from] tungstenite::Error),

    /// The backend accepted the handshake but the caller's connection could
    /// not be upgraded.
    #[error("caller connection cannot be upgraded: {0}")]
    LocalUpgrade(#[from] WebSocketUpgradeRejection),

    /// The rewritten request could not be assembled.
    #[error("invalid backend request: {0}")]
    InvalidTarget(#[from] axum::http::Error),
}

impl BridgeError {
    /// Short, stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::BackendUnavailable { .. } => "backend_unavailable",
            BridgeError::BackendConnect { .. } => "backend_connect",
            BridgeError::BackendRequest(_) => "backend_request",
            BridgeError::BackendRejected(_) => "backend_rejected",
            BridgeError::BackendHandshake(_) => "backend_handshake",
            BridgeError::LocalUpgrade(_) => "local_upgrade",
            BridgeError::InvalidTarget(_) => "invalid_target",
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        tracing::warn!(kind = self.kind(), error = %self, "Request failed");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}
