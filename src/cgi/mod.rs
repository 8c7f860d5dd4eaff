//! CGI/1.1 front adapter.
//!
//! # Data Flow
//! ```text
//! web server spawns the process
//!     → request.rs (meta-variables → request head)
//!     → CONTENT_LENGTH bytes from stdin → body
//!     → bridge router (one oneshot call)
//!     → response.rs (Status + headers + body → stdout)
//! ```
//!
//! # Design Decisions
//! - Exactly one request in, exactly one response out per process
//! - Stdio cannot be upgraded: WebSocket requests end in the local-upgrade
//!   500 after the backend handshake is released

pub mod request;
pub mod response;

use std::collections::HashMap;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tower::ServiceExt;

pub use request::{from_env, CgiRequest};
pub use response::write_response;

/// Failure to read a CGI invocation or write its response.
#[derive(Debug, Error)]
pub enum CgiError {
    #[error("missing CGI variable {0}")]
    MissingVariable(&'static str),

    #[error("invalid CGI variable {0}: {1:?}")]
    InvalidVariable(&'static str, String),

    #[error("CGI I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serve a single CGI invocation through `app`.
pub async fn serve<R, W>(
    app: Router,
    vars: &HashMap<String, String>,
    stdin: R,
    stdout: &mut W,
) -> Result<(), CgiError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let CgiRequest {
        parts,
        content_length,
    } = from_env(vars)?;

    let mut body = Vec::new();
    if content_length > 0 {
        stdin.take(content_length).read_to_end(&mut body).await?;
    }

    tracing::debug!(
        method = %parts.method,
        uri = %parts.uri,
        body_bytes = body.len(),
        "CGI request received"
    );

    let request = Request::from_parts(parts, Body::from(body));
    let response = match app.oneshot(request).await {
        Ok(response) => response,
        Err(infallible) => match infallible {},
    };

    write_response(response, stdout).await?;
    Ok(())
}
