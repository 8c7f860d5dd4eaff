//! Per-request backend reachability check.
//!
//! The backend may start after the front-end process manager, so the socket
//! is stat'ed before every request rather than once at startup.

use std::path::Path;

use crate::http::error::BridgeError;

/// Fail with `BackendUnavailable` unless the socket path exists.
pub fn ensure_reachable(socket_path: &Path) -> Result<(), BridgeError> {
    match std::fs::metadata(socket_path) {
        Ok(_) => Ok(()),
        Err(source) => Err(BridgeError::BackendUnavailable {
            path: socket_path.to_path_buf(),
            source,
        }),
    }
}
