//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Complete the handshake with the backend first, over its Unix socket
//! - Upgrade the caller's connection using the backend's handshake response
//! - Hand both connections to a relay session
//!
//! # Data Flow
//! ```text
//! Caller ←──── WebSocket frames ────→ Bridge ←──── WebSocket frames ────→ Backend (unix socket)
//! ```
//!
//! # Design Decisions
//! - The backend is dialed before the caller is upgraded, so a backend
//!   failure can still be reported as a plain HTTP 500
//! - Handshake-owned headers are regenerated per hop, everything else is
//!   passed through
//! - Frame-level forwarding (no message buffering)

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::FromRequestParts;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::http::{Method, Request, Version};
use axum::response::Response;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tracing::Instrument;

use crate::backend::connector::{self, BackendSocket};
use crate::backend::BackendTarget;
use crate::http::error::BridgeError;
use crate::http::relay;
use crate::http::rewrite::{RewrittenRequest, BACKEND_HOST};

/// Request headers the backend handshake generates itself.
const CLIENT_HANDSHAKE_HEADERS: [HeaderName; 6] = [
    header::HOST,
    header::CONNECTION,
    header::UPGRADE,
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
];

/// Response headers the caller-side upgrade generates itself.
const SERVER_HANDSHAKE_HEADERS: [HeaderName; 7] = [
    header::CONNECTION,
    header::UPGRADE,
    header::SEC_WEBSOCKET_ACCEPT,
    header::SEC_WEBSOCKET_PROTOCOL,
    header::SEC_WEBSOCKET_EXTENSIONS,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
];

/// Bridge an upgrade request: backend handshake, caller upgrade, relay.
///
/// `parts` is the caller's original request head; it carries the connection
/// upgrade handle when the front end supports one.
pub async fn bridge(
    target: &BackendTarget,
    rewritten: RewrittenRequest,
    mut parts: Parts,
) -> Result<Response, BridgeError> {
    let request = handshake_request(&rewritten)?;
    let (backend, handshake) = connector::open_websocket(&target.socket_path, request).await?;

    tracing::debug!(status = %handshake.status(), "Backend accepted WebSocket handshake");

    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            release(backend).await;
            return Err(BridgeError::LocalUpgrade(rejection));
        }
    };

    let upgrade = match selected_protocol(handshake.headers()) {
        Some(protocol) => upgrade.protocols([protocol]),
        None => upgrade,
    };

    let span = tracing::Span::current();
    let mut response = upgrade
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "Caller connection was not upgraded"))
        .on_upgrade(move |caller| relay::run_session(caller, backend).instrument(span));

    copy_handshake_response_headers(handshake.headers(), response.headers_mut());

    Ok(response)
}

/// Build the backend handshake for `ws://unix/<path>`: the caller's
/// (already rewritten) headers plus a fresh key.
pub fn handshake_request(rewritten: &RewrittenRequest) -> Result<Request<Body>, BridgeError> {
    let key = HeaderValue::from_str(&generate_key()).map_err(axum::http::Error::from)?;

    let mut request = Request::builder()
        .method(Method::GET)
        .uri(rewritten.path_and_query())
        .version(Version::HTTP_11)
        .body(Body::empty())?;

    let headers = request.headers_mut();
    for (name, value) in &rewritten.headers {
        if CLIENT_HANDSHAKE_HEADERS.contains(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers.insert(header::HOST, HeaderValue::from_static(BACKEND_HOST));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
    headers.insert(header::SEC_WEBSOCKET_KEY, key);

    Ok(request)
}

fn selected_protocol(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn copy_handshake_response_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if SERVER_HANDSHAKE_HEADERS.contains(name) {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}

async fn release(mut backend: BackendSocket) {
    if let Err(e) = backend.close(None).await {
        tracing::debug!(error = %e, "Backend connection closed uncleanly");
    }
}
