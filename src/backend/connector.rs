//! Unix socket transport to the backend.
//!
//! # Responsibilities
//! - Dial the backend socket, once per request or session
//! - Drive an HTTP/1.1 client connection for plain requests
//! - Perform the client side of the WebSocket handshake
//!
//! # Design Decisions
//! - No pooling: each connection is owned by one request and dropped with it
//! - The nominal URI host is never resolved; every dial goes to the socket
//! - The WebSocket handshake runs over the same HTTP/1.1 client and is
//!   verified here, so a backend may decline every offered subprotocol

use std::path::Path;

use axum::body::Body;
use axum::http::header::{SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use axum::http::{Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::WebSocketStream;

use crate::http::error::BridgeError;

/// An established WebSocket connection to the backend.
pub type BackendSocket = WebSocketStream<TokioIo<Upgraded>>;

/// Connect to the backend socket.
pub async fn dial(socket_path: &Path) -> Result<UnixStream, BridgeError> {
    UnixStream::connect(socket_path)
        .await
        .map_err(|source| BridgeError::BackendConnect {
            path: socket_path.to_path_buf(),
            source,
        })
}

async fn connect(socket_path: &Path) -> Result<http1::SendRequest<Body>, BridgeError> {
    let stream = dial(socket_path).await?;
    let (sender, connection) = http1::handshake(TokioIo::new(stream)).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.with_upgrades().await {
            tracing::debug!(error = %e, "Backend connection closed with error");
        }
    });

    Ok(sender)
}

/// Send one request over a fresh connection and return the backend's
/// response with its body still streaming.
pub async fn send_request(
    socket_path: &Path,
    request: Request<Body>,
) -> Result<Response<Incoming>, BridgeError> {
    let mut sender = connect(socket_path).await?;
    Ok(sender.send_request(request).await?)
}

/// Send a WebSocket handshake request and take over the upgraded connection.
///
/// Only `101` with a matching `Sec-WebSocket-Accept` is accepted. The
/// backend's subprotocol choice, including none, is left to the caller.
pub async fn open_websocket(
    socket_path: &Path,
    request: Request<Body>,
) -> Result<(BackendSocket, Response<Incoming>), BridgeError> {
    let expected_accept = request
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .map(|key| derive_accept_key(key.as_bytes()))
        .ok_or_else(|| {
            BridgeError::BackendHandshake(WsError::Protocol(ProtocolError::MissingSecWebSocketKey))
        })?;

    let mut sender = connect(socket_path).await?;
    let mut response = sender.send_request(request).await?;

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(BridgeError::BackendRejected(response.status()));
    }
    verify_handshake(&response, &expected_accept)?;

    let upgraded = hyper::upgrade::on(&mut response).await?;
    let socket = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Client, None).await;

    Ok((socket, response))
}

fn verify_handshake<B>(response: &Response<B>, expected_accept: &str) -> Result<(), BridgeError> {
    let headers = response.headers();

    let upgraded_to_websocket = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if !upgraded_to_websocket {
        return Err(BridgeError::BackendHandshake(WsError::Protocol(
            ProtocolError::MissingUpgradeWebSocketHeader,
        )));
    }

    if headers.get(SEC_WEBSOCKET_ACCEPT).map(|v| v.as_bytes()) != Some(expected_accept.as_bytes()) {
        return Err(BridgeError::BackendHandshake(WsError::Protocol(
            ProtocolError::SecWebSocketAcceptKeyMismatch,
        )));
    }

    Ok(())
}
