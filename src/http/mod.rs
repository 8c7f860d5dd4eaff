//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! front end (CGI adapter or TCP listener)
//!     → server.rs (Axum router, request span)
//!     → backend reachability check
//!     → rewrite.rs (strip base path, forwarding headers, socket markers)
//!     → forward.rs (plain HTTP over the socket), or
//!       websocket.rs (double handshake) → relay.rs (two relay tasks)
//!     → error.rs (any failure before commit → bare 500)
//! ```

pub mod error;
pub mod forward;
pub mod relay;
pub mod rewrite;
pub mod server;
pub mod websocket;

pub use error::BridgeError;
pub use rewrite::{rewrite, RewrittenRequest};
pub use server::{build_router, HttpServer};
