//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use cgi_proxy::backend::{BackendTarget, BasePath};
use cgi_proxy::{HttpServer, Shutdown};

/// A request as the mock backend saw it on the wire.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or("")
    }

    /// Every value of a header, in wire order (case-insensitive name).
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.head
            .lines()
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .filter(|(n, _)| n.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
            .collect()
    }
}

/// Temp dir holding a backend socket path.
pub struct SocketDir {
    dir: tempfile::TempDir,
}

impl SocketDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn socket(&self) -> PathBuf {
        self.dir.path().join("backend.sock")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub fn target(socket: &Path, base_path: &str) -> BackendTarget {
    BackendTarget::new(socket, BasePath::resolve(base_path, Path::new("/")))
}

/// Start a mock backend on a Unix socket that answers every connection with
/// a fixed raw HTTP response and reports what it received.
pub fn start_mock_backend(
    path: &Path,
    response: &'static str,
) -> mpsc::UnboundedReceiver<ReceivedRequest> {
    let listener = UnixListener::bind(path).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Some(received) = read_request(&mut socket).await {
                            let _ = tx.send(received);
                        }
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    rx
}

/// Start a backend that accepts and immediately hangs up.
pub fn start_hangup_backend(path: &Path) {
    let listener = UnixListener::bind(path).unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
}

async fn read_request(socket: &mut UnixStream) -> Option<ReceivedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut received = ReceivedRequest {
        head,
        body: buf[head_end + 4..].to_vec(),
    };

    let content_length = received
        .header_values("content-length")
        .first()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    while received.body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        received.body.extend_from_slice(&chunk[..n]);
    }

    Some(received)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// What a WebSocket backend does after the handshake.
#[derive(Debug, Clone)]
pub enum WsBehaviour {
    /// Echo text and binary messages until the peer closes.
    Echo,
    /// Like `Echo`, but never select an offered subprotocol.
    EchoIgnoringSubprotocols,
    /// Read until the connection ends, then report it.
    Watch(mpsc::UnboundedSender<()>),
    /// Send one text message, then close with the given code and reason.
    GreetAndClose(&'static str, u16, &'static str),
}

/// Handshake details seen by the WebSocket backend.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub uri: String,
    pub headers: HeaderMap,
}

/// Start a WebSocket backend on a Unix socket.
///
/// The first offered subprotocol, if any, is accepted unless the behaviour
/// says otherwise.
pub fn start_ws_backend(path: &Path, behaviour: WsBehaviour) -> mpsc::UnboundedReceiver<Handshake> {
    let listener = UnixListener::bind(path).unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let behaviour = behaviour.clone();
            tokio::spawn(async move {
                let selects_protocol = !matches!(behaviour, WsBehaviour::EchoIgnoringSubprotocols);
                let callback = |req: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
                    let _ = tx.send(Handshake {
                        uri: req.uri().to_string(),
                        headers: req.headers().clone(),
                    });
                    let offered = req
                        .headers()
                        .get("sec-websocket-protocol")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.split(',').next())
                        .map(|v| v.trim().to_string());
                    if let Some(protocol) = offered.filter(|_| selects_protocol) {
                        response.headers_mut().insert(
                            "sec-websocket-protocol",
                            HeaderValue::from_str(&protocol).unwrap(),
                        );
                    }
                    Ok(response)
                };

                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, callback).await else {
                    return;
                };

                match behaviour {
                    WsBehaviour::Echo | WsBehaviour::EchoIgnoringSubprotocols => {
                        while let Some(Ok(message)) = ws.next().await {
                            match message {
                                Message::Text(_) | Message::Binary(_) => {
                                    if ws.send(message).await.is_err() {
                                        break;
                                    }
                                }
                                Message::Close(_) => break,
                                _ => {}
                            }
                        }
                    }
                    WsBehaviour::GreetAndClose(greeting, code, reason) => {
                        let _ = ws.send(Message::Text(greeting.to_string().into())).await;
                        let _ = ws
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.to_string().into(),
                            })))
                            .await;
                        while let Some(Ok(_)) = ws.next().await {}
                    }
                    WsBehaviour::Watch(ended) => {
                        while let Some(Ok(message)) = ws.next().await {
                            if message.is_close() {
                                break;
                            }
                        }
                        let _ = ended.send(());
                    }
                }
            });
        }
    });

    rx
}

/// Start a WebSocket backend that stops reading right after the handshake
/// (writes towards it fail) and then sends `ticks` text messages.
pub fn start_deaf_ws_backend(path: &Path, ticks: usize) {
    let listener = UnixListener::bind(path).unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let Some(request) = read_request(&mut socket).await else {
            return;
        };
        let key = request
            .header_values("sec-websocket-key")
            .first()
            .map(|k| k.to_string())
            .unwrap_or_default();

        let socket = socket.into_std().unwrap();
        socket.shutdown(std::net::Shutdown::Read).unwrap();
        let mut socket = UnixStream::from_std(socket).unwrap();

        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            derive_accept_key(key.as_bytes())
        );
        socket.write_all(response.as_bytes()).await.unwrap();

        let mut ws = WebSocketStream::from_raw_socket(socket, Role::Server, None).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        for i in 0..ticks {
            if ws.send(Message::Text(format!("tick-{i}").into())).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    });
}

/// Complete a WebSocket handshake by hand, so the response is not checked
/// against the offered subprotocol. Returns the response head.
pub async fn raw_ws_connect(
    addr: SocketAddr,
    path: &str,
    protocol: &str,
) -> (String, WebSocketStream<TcpStream>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Protocol: {protocol}\r\n\r\n",
        generate_key()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    // One byte at a time so no frame bytes are consumed with the head.
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(stream.read_u8().await.unwrap());
    }

    let ws = WebSocketStream::from_raw_socket(stream, Role::Client, None).await;
    (String::from_utf8(head).unwrap(), ws)
}

/// A running bridge in serve mode.
pub struct Bridge {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl Bridge {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the bridge on an ephemeral loopback port.
pub async fn start_bridge(target: BackendTarget) -> Bridge {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(target);

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    Bridge { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
