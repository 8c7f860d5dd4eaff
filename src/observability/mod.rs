//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → one span per request (request_id, method, path)
//!
//! Consumers:
//!     → logging.rs subscriber → stderr (web server error log under CGI)
//! ```

pub mod logging;
