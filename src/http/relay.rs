//! Bidirectional WebSocket relay.
//!
//! # Data Flow
//! ```text
//! caller ──read──▶ [upstream task]   ──write──▶ backend
//! caller ◀─write── [downstream task] ◀──read─── backend
//! ```
//!
//! Each task is a two-state machine: OPEN while messages flow, CLOSED after
//! the first failed read or write (or when its source ends). A closing task
//! closes its destination, which lets that peer end the other direction on
//! its own. The session waits for both tasks, then drops both connections.

use std::fmt;

use axum::extract::ws::{CloseFrame as CallerCloseFrame, Message as CallerMessage, WebSocket};
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as BackendCloseFrame;
use tokio_tungstenite::tungstenite::Message as BackendMessage;

use crate::backend::connector::BackendSocket;

/// Direction of message flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Caller -> backend.
    Upstream,
    /// Backend -> caller.
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => write!(f, "upstream"),
            Direction::Downstream => write!(f, "downstream"),
        }
    }
}

/// Why a relay direction stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// The source stream finished.
    SourceClosed,
    /// Reading from the source failed.
    ReadFailed(String),
    /// Writing to the destination failed.
    WriteFailed(String),
}

/// Totals for one finished direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub direction: Direction,
    pub forwarded: u64,
    pub end: RelayEnd,
}

/// Forward messages from `source` to `sink` until either side fails, then
/// close `sink` so its peer sees the end of this direction.
pub async fn relay<M, S, K, RE, WE>(mut source: S, mut sink: K, direction: Direction) -> RelayReport
where
    S: Stream<Item = Result<M, RE>> + Unpin,
    K: Sink<M, Error = WE> + Unpin,
    RE: fmt::Display,
    WE: fmt::Display,
{
    let mut forwarded = 0u64;

    let end = loop {
        let message = match source.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => break RelayEnd::ReadFailed(e.to_string()),
            None => break RelayEnd::SourceClosed,
        };

        if let Err(e) = sink.send(message).await {
            break RelayEnd::WriteFailed(e.to_string());
        }
        forwarded += 1;
    };

    if let Err(e) = sink.close().await {
        tracing::debug!(%direction, error = %e, "Closing relay destination failed");
    }

    tracing::debug!(%direction, forwarded, end = ?end, "Relay stopped");

    RelayReport {
        direction,
        forwarded,
        end,
    }
}

/// Run a session between an upgraded caller socket and a backend socket.
///
/// Both connections are dropped when this returns.
pub async fn run_session(caller: WebSocket, backend: BackendSocket) {
    tracing::info!("WebSocket session opened");

    let (caller_tx, caller_rx) = caller.split();
    let (backend_tx, backend_rx) = backend.split();

    let upstream_source = caller_rx.filter_map(|r| future::ready(map_read(r, caller_to_backend)));
    let downstream_source = backend_rx.filter_map(|r| future::ready(map_read(r, backend_to_caller)));

    run_relays(upstream_source, backend_tx, downstream_source, caller_tx).await;

    tracing::info!("WebSocket session closed");
}

/// Spawn one task per direction and wait for both.
///
/// A stopped direction never cancels the other; it only closes its own
/// destination.
pub async fn run_relays<UM, US, UK, DM, DS, DK, URE, UWE, DRE, DWE>(
    upstream_source: US,
    upstream_sink: UK,
    downstream_source: DS,
    downstream_sink: DK,
) -> Vec<RelayReport>
where
    UM: Send + 'static,
    DM: Send + 'static,
    US: Stream<Item = Result<UM, URE>> + Unpin + Send + 'static,
    UK: Sink<UM, Error = UWE> + Unpin + Send + 'static,
    DS: Stream<Item = Result<DM, DRE>> + Unpin + Send + 'static,
    DK: Sink<DM, Error = DWE> + Unpin + Send + 'static,
    URE: fmt::Display + Send + 'static,
    UWE: fmt::Display + Send + 'static,
    DRE: fmt::Display + Send + 'static,
    DWE: fmt::Display + Send + 'static,
{
    let upstream = tokio::spawn(relay(upstream_source, upstream_sink, Direction::Upstream));
    let downstream = tokio::spawn(relay(downstream_source, downstream_sink, Direction::Downstream));

    let (upstream, downstream) = tokio::join!(upstream, downstream);
    let mut reports = Vec::with_capacity(2);
    for result in [upstream, downstream] {
        match result {
            Ok(report) => {
                tracing::debug!(
                    direction = %report.direction,
                    forwarded = report.forwarded,
                    "Relay task finished"
                );
                reports.push(report);
            }
            Err(e) => tracing::warn!(error = %e, "Relay task panicked or was cancelled"),
        }
    }
    reports
}

fn map_read<A, B, E>(read: Result<A, E>, map: fn(A) -> Option<B>) -> Option<Result<B, E>> {
    match read {
        Ok(message) => map(message).map(Ok),
        Err(e) => Some(Err(e)),
    }
}

/// Map a caller frame to the same frame type and payload for the backend.
///
/// Ping and pong are answered by each hop's own WebSocket stack and are
/// not relayed.
pub fn caller_to_backend(message: CallerMessage) -> Option<BackendMessage> {
    let message = match message {
        CallerMessage::Text(text) => BackendMessage::Text(text.to_string().into()),
        CallerMessage::Binary(data) => BackendMessage::Binary(data),
        CallerMessage::Ping(_) | CallerMessage::Pong(_) => return None,
        CallerMessage::Close(frame) => BackendMessage::Close(frame.map(|f| BackendCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.to_string().into(),
        })),
    };
    Some(message)
}

/// Map a backend frame to the caller's type. Control frames other than
/// close are not relayed; raw frames are never produced by reads.
pub fn backend_to_caller(message: BackendMessage) -> Option<CallerMessage> {
    let message = match message {
        BackendMessage::Text(text) => CallerMessage::Text(text.to_string().into()),
        BackendMessage::Binary(data) => CallerMessage::Binary(data),
        BackendMessage::Ping(_) | BackendMessage::Pong(_) | BackendMessage::Frame(_) => return None,
        BackendMessage::Close(frame) => CallerMessage::Close(frame.map(|f| CallerCloseFrame {
            code: u16::from(f.code),
            reason: f.reason.to_string().into(),
        })),
    };
    Some(message)
}
