//! CGI meta-variables → HTTP request head.
//!
//! # Responsibilities
//! - Rebuild method, URL, version and headers from RFC 3875 variables
//! - Recover the caller's address from `REMOTE_ADDR` / `REMOTE_PORT`
//! - Report how many body bytes to read from stdin
//!
//! # Design Decisions
//! - `REQUEST_URI` wins over `SCRIPT_NAME` + `PATH_INFO` + `QUERY_STRING`
//! - With `HTTP_HOST` set the URL is absolute, so the rewriter sees the
//!   original host and scheme
//! - `HTTP_PROXY` is never turned into a header (httpoxy)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::request::Parts;
use axum::http::{Method, Request, Uri, Version};

use crate::cgi::CgiError;

/// A request head rebuilt from the environment plus the body length.
#[derive(Debug)]
pub struct CgiRequest {
    pub parts: Parts,
    pub content_length: u64,
}

/// Build a request head from CGI meta-variables.
pub fn from_env(vars: &HashMap<String, String>) -> Result<CgiRequest, CgiError> {
    let get = |key: &str| vars.get(key).map(String::as_str).filter(|v| !v.is_empty());

    let method = get("REQUEST_METHOD").ok_or(CgiError::MissingVariable("REQUEST_METHOD"))?;
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| CgiError::InvalidVariable("REQUEST_METHOD", method.to_string()))?;

    let version = match get("SERVER_PROTOCOL") {
        None | Some("HTTP/1.1") => Version::HTTP_11,
        Some("HTTP/1.0") => Version::HTTP_10,
        Some(other) => {
            return Err(CgiError::InvalidVariable("SERVER_PROTOCOL", other.to_string()))
        }
    };

    let content_length = match get("CONTENT_LENGTH") {
        None => 0,
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| CgiError::InvalidVariable("CONTENT_LENGTH", raw.to_string()))?,
    };

    let host = get("HTTP_HOST");
    let https = matches!(get("HTTPS"), Some(v) if v.eq_ignore_ascii_case("on") || v == "1");
    let uri = build_uri(
        host,
        if https { "https" } else { "http" },
        get("REQUEST_URI"),
        get("SCRIPT_NAME").unwrap_or_default(),
        get("PATH_INFO").unwrap_or_default(),
        get("QUERY_STRING"),
    )?;

    let mut builder = Request::builder().method(method).uri(uri).version(version);

    if let Some(headers) = builder.headers_mut() {
        if let Some(host) = host {
            headers.insert(HOST, header_value("HTTP_HOST", host)?);
        }
        if let Some(content_type) = get("CONTENT_TYPE") {
            headers.insert(CONTENT_TYPE, header_value("CONTENT_TYPE", content_type)?);
        }
        if content_length > 0 {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
        }

        let mut names: Vec<&String> = vars.keys().collect();
        names.sort();
        for key in names {
            let Some(name) = header_name(key) else {
                continue;
            };
            headers.append(name, header_value("HTTP_*", &vars[key])?);
        }
    }

    if let Some(remote) = remote_addr(get("REMOTE_ADDR"), get("REMOTE_PORT")) {
        builder = builder.extension(ConnectInfo(remote));
    }

    let (parts, ()) = builder
        .body(())
        .map_err(|e| CgiError::InvalidVariable("REQUEST_URI", e.to_string()))?
        .into_parts();

    Ok(CgiRequest {
        parts,
        content_length,
    })
}

fn build_uri(
    host: Option<&str>,
    scheme: &str,
    request_uri: Option<&str>,
    script_name: &str,
    path_info: &str,
    query: Option<&str>,
) -> Result<Uri, CgiError> {
    let mut target = match request_uri {
        Some(uri) => uri.to_string(),
        None => {
            let mut target = format!("{}{}", script_name, path_info);
            if let Some(query) = query {
                target.push('?');
                target.push_str(query);
            }
            target
        }
    };
    if !target.starts_with('/') {
        target.insert(0, '/');
    }

    let raw = match host {
        Some(host) => format!("{}://{}{}", scheme, host, target),
        None => target,
    };
    raw.parse::<Uri>()
        .map_err(|_| CgiError::InvalidVariable("REQUEST_URI", raw))
}

/// `HTTP_X_REQUEST_ID` → `x-request-id`. Host and proxy are excluded.
fn header_name(key: &str) -> Option<HeaderName> {
    let suffix = key.strip_prefix("HTTP_")?;
    if suffix.is_empty() || suffix == "HOST" || suffix == "PROXY" {
        return None;
    }
    let name = suffix.replace('_', "-").to_ascii_lowercase();
    HeaderName::from_bytes(name.as_bytes()).ok()
}

fn header_value(variable: &'static str, value: &str) -> Result<HeaderValue, CgiError> {
    HeaderValue::from_str(value).map_err(|_| CgiError::InvalidVariable(variable, value.to_string()))
}

fn remote_addr(addr: Option<&str>, port: Option<&str>) -> Option<SocketAddr> {
    let ip: IpAddr = addr?.trim().parse().ok()?;
    let port = port.and_then(|p| p.trim().parse::<u16>().ok()).unwrap_or(0);
    Some(SocketAddr::new(ip, port))
}
