//! Single CGI invocations driven through in-memory stdin/stdout.

mod common;

use std::collections::HashMap;

use cgi_proxy::build_router;
use cgi_proxy::cgi;
use common::*;
use std::sync::Arc;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn invoke(
    target: cgi_proxy::BackendTarget,
    vars: HashMap<String, String>,
    stdin: &[u8],
) -> String {
    let app = build_router(Arc::new(target));
    let mut stdout = Vec::new();
    cgi::serve(app, &vars, stdin, &mut stdout).await.unwrap();
    String::from_utf8(stdout).unwrap()
}

/// A 500 status line, any headers, and an empty body.
fn assert_bare_500(output: &str) {
    assert!(output.starts_with("Status: 500 Internal Server Error\r\n"), "{output}");
    let (_, body) = output.split_once("\r\n\r\n").expect("no blank line after the head");
    assert!(body.is_empty(), "{output}");
}

#[tokio::test]
async fn request_is_forwarded_and_response_written_as_cgi() {
    let dir = SocketDir::new();
    let mut requests = start_mock_backend(
        &dir.socket(),
        "HTTP/1.1 202 Accepted\r\n\
         X-Backend: yes\r\n\
         Content-Length: 8\r\n\
         Connection: close\r\n\
         \r\n\
         accepted",
    );

    let output = invoke(
        target(&dir.socket(), "/cgi-bin/app"),
        env(&[
            ("REQUEST_METHOD", "POST"),
            ("SERVER_PROTOCOL", "HTTP/1.1"),
            ("REQUEST_URI", "/cgi-bin/app/orders?draft=1"),
            ("HTTP_HOST", "front.example"),
            ("HTTPS", "on"),
            ("REMOTE_ADDR", "192.0.2.10"),
            ("REMOTE_PORT", "51000"),
            ("CONTENT_TYPE", "text/plain"),
            ("CONTENT_LENGTH", "5"),
            ("HTTP_X_FORWARDED_FOR", "10.9.9.9"),
        ]),
        b"12345 trailing bytes past CONTENT_LENGTH",
    )
    .await;

    assert!(output.starts_with("Status: 202 Accepted\r\n"), "{output}");
    assert!(output.contains("x-backend: yes\r\n"), "{output}");
    assert!(output.ends_with("\r\n\r\naccepted"), "{output}");

    let seen = requests.recv().await.unwrap();
    assert_eq!(seen.request_line(), "POST /orders?draft=1 HTTP/1.1");
    assert_eq!(seen.header_values("host"), ["unix"]);
    assert_eq!(seen.header_values("x-forwarded-for"), ["192.0.2.10"]);
    assert_eq!(seen.header_values("x-forwarded-host"), ["front.example"]);
    assert_eq!(seen.header_values("x-forwarded-proto"), ["https"]);
    assert_eq!(seen.header_values("content-type"), ["text/plain"]);
    assert_eq!(seen.body, b"12345");
}

#[tokio::test]
async fn missing_socket_writes_500() {
    let dir = SocketDir::new();

    let output = invoke(
        target(&dir.socket(), "/cgi-bin/app"),
        env(&[
            ("REQUEST_METHOD", "GET"),
            ("REQUEST_URI", "/cgi-bin/app/"),
            ("HTTP_HOST", "front.example"),
        ]),
        b"",
    )
    .await;

    assert_bare_500(&output);
}

#[tokio::test]
async fn websocket_request_fails_after_backend_handshake() {
    let dir = SocketDir::new();
    let mut handshakes = start_ws_backend(&dir.socket(), WsBehaviour::Echo);

    let output = invoke(
        target(&dir.socket(), "/cgi-bin/app"),
        env(&[
            ("REQUEST_METHOD", "GET"),
            ("REQUEST_URI", "/cgi-bin/app/socket"),
            ("HTTP_HOST", "front.example"),
            ("HTTP_CONNECTION", "Upgrade"),
            ("HTTP_UPGRADE", "websocket"),
            ("HTTP_SEC_WEBSOCKET_KEY", "dGhlIHNhbXBsZSBub25jZQ=="),
            ("HTTP_SEC_WEBSOCKET_VERSION", "13"),
        ]),
        b"",
    )
    .await;

    assert_bare_500(&output);

    let handshake = handshakes.recv().await.unwrap();
    assert_eq!(handshake.uri, "/socket");
}

#[tokio::test]
async fn malformed_environment_is_an_error() {
    let dir = SocketDir::new();
    let app = build_router(Arc::new(target(&dir.socket(), "/")));
    let mut stdout = Vec::new();

    let result = cgi::serve(app, &env(&[("REQUEST_URI", "/")]), &b""[..], &mut stdout).await;

    assert!(matches!(
        result,
        Err(cgi::CgiError::MissingVariable("REQUEST_METHOD"))
    ));
    assert!(stdout.is_empty());
}
