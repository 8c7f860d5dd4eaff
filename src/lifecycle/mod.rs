//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! CGI mode:
//!     Load config → Resolve target → Serve one request → Exit
//!
//! Serve mode:
//!     Load config → Resolve target → Bind listener → Serve
//!     SIGTERM/SIGINT (signals.rs) → shutdown.rs broadcast → stop accepting → drain
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The backend is not probed at startup; each request checks it

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
