//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → loader.rs (optional TOML file)
//!     → loader.rs (.env file into the environment, CGI_PROXY_* overrides)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → BackendTarget resolved once at startup, shared via Arc
//! ```
//!
//! # Design Decisions
//! - Config is resolved once per process; the handler never reads the environment
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BackendConfig;
pub use schema::BridgeConfig;
pub use schema::ListenerConfig;
pub use schema::{LogFormat, LoggingConfig};
