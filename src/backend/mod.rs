//! Backend (origin) subsystem.
//!
//! # Data Flow
//! ```text
//! BridgeConfig.backend
//!     → target.rs (socket path + resolved base path, built once)
//!
//! Per request:
//!     reachability.rs (stat the socket, fail fast if absent)
//!     → connector.rs (dial UnixStream)
//!         → HTTP/1.1 client connection, or
//!         → WebSocket client handshake
//! ```
//!
//! # Design Decisions
//! - The socket is re-validated per request; no cached "backend up" flag
//! - One dial per request or session; no pool, no retries

pub mod connector;
pub mod reachability;
pub mod target;

pub use reachability::ensure_reachable;
pub use target::{BackendTarget, BasePath};
