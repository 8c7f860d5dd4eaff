//! Request rewriting.
//!
//! # Responsibilities
//! - Strip the base path from the incoming path (literal prefix, at most once)
//! - Replace the forwarding headers with exactly one value each
//! - Retarget host and scheme to the backend socket markers
//!
//! # Design Decisions
//! - The caller's headers are copied into a new map; the original is untouched
//! - Pure transformation: no I/O and no error conditions

use std::net::SocketAddr;

use axum::http::header::{HeaderName, HeaderValue, HOST, UPGRADE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method};

use crate::backend::BasePath;

/// Client IP as observed by the front end.
pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
/// Host the caller addressed.
pub static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
/// Scheme the caller used.
pub static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Placeholder authority meaning "the backend's Unix socket".
pub const BACKEND_HOST: &str = "unix";

/// Scheme marker for the rewritten request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendScheme {
    Http,
    WebSocket,
}

impl BackendScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendScheme::Http => "http",
            BackendScheme::WebSocket => "ws",
        }
    }
}

/// The backend-addressed copy of an incoming request.
#[derive(Debug, Clone)]
pub struct RewrittenRequest {
    pub method: Method,
    pub scheme: BackendScheme,
    /// Incoming path minus the base path; may be empty.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
}

impl RewrittenRequest {
    pub fn is_upgrade(&self) -> bool {
        self.scheme == BackendScheme::WebSocket
    }

    /// Origin-form target sent on the wire. An empty or relative stripped
    /// path gets a leading slash.
    pub fn path_and_query(&self) -> String {
        let mut target = String::with_capacity(self.path.len() + 1);
        if !self.path.starts_with('/') {
            target.push('/');
        }
        target.push_str(&self.path);
        if let Some(query) = &self.query {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    /// Absolute URL using the scheme and host markers, e.g. `ws://unix/chat`.
    pub fn url(&self) -> String {
        format!(
            "{}://{}{}",
            self.scheme.as_str(),
            BACKEND_HOST,
            self.path_and_query()
        )
    }
}

/// True when the `Upgrade` header asks for WebSocket (case-insensitive).
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Derive the backend-addressed request from the caller's request head.
pub fn rewrite(parts: &Parts, remote: Option<SocketAddr>, base_path: &BasePath) -> RewrittenRequest {
    let original_host = parts
        .uri
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            parts
                .headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default();
    let original_scheme = parts.uri.scheme_str().unwrap_or("http");
    let client_ip = remote.map(|addr| addr.ip().to_string()).unwrap_or_default();

    let mut headers = parts.headers.clone();
    set_single(&mut headers, &X_FORWARDED_FOR, &client_ip);
    set_single(&mut headers, &X_FORWARDED_HOST, &original_host);
    set_single(&mut headers, &X_FORWARDED_PROTO, original_scheme);
    headers.insert(HOST, HeaderValue::from_static(BACKEND_HOST));

    let scheme = if is_websocket_upgrade(&headers) {
        BackendScheme::WebSocket
    } else {
        BackendScheme::Http
    };

    RewrittenRequest {
        method: parts.method.clone(),
        scheme,
        path: base_path.strip(parts.uri.path()).to_string(),
        query: parts.uri.query().map(str::to_string),
        headers,
    }
}

/// Drop every existing value of `name` and set exactly one.
fn set_single(headers: &mut HeaderMap, name: &HeaderName, value: &str) {
    let value = HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""));
    // `insert` replaces all prior values of the name.
    headers.insert(name.clone(), value);
}
