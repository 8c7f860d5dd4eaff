//! Plain HTTP forwarding over the backend socket.
//!
//! # Design Decisions
//! - The backend response is not buffered: status and headers are committed
//!   first, then the body streams through
//! - Status, every header value and the body are passed on verbatim
//! - Trailers are not supported
//! - No retries and no timeout beyond the transport's defaults

use axum::body::Body;
use axum::http::{Request, Version};
use axum::response::Response;

use crate::backend::connector;
use crate::backend::BackendTarget;
use crate::http::error::BridgeError;
use crate::http::rewrite::RewrittenRequest;

/// Send a rewritten, non-upgrade request and relay the backend's response.
pub async fn forward(
    target: &BackendTarget,
    rewritten: RewrittenRequest,
    body: Body,
) -> Result<Response, BridgeError> {
    let mut request = Request::builder()
        .method(rewritten.method.clone())
        .uri(rewritten.path_and_query())
        .version(Version::HTTP_11)
        .body(body)?;
    *request.headers_mut() = rewritten.headers;

    let response = connector::send_request(&target.socket_path, request).await?;

    tracing::debug!(status = %response.status(), "Backend responded");

    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}
