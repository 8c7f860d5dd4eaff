//! CGI to Unix-socket bridge library.
//!
//! Exposes a backend that only listens on a Unix domain socket through a
//! front end that speaks CGI: every invocation is rewritten, forwarded over
//! the socket, and answered with the backend's response. WebSocket upgrades
//! are relayed frame by frame when the front end can upgrade the caller.

pub mod backend;
pub mod cgi;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use backend::BackendTarget;
pub use config::BridgeConfig;
pub use http::{build_router, HttpServer};
pub use lifecycle::Shutdown;
