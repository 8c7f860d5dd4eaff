//! Resolved backend address and base path.
//!
//! # Responsibilities
//! - Hold the backend socket path for the process lifetime
//! - Resolve the configured base path to an absolute, lexically clean prefix
//! - Strip that prefix from incoming paths at most once

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::config::BackendConfig;

/// Where requests go: the backend socket plus the prefix to strip.
///
/// Immutable once built; shared read-only by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub socket_path: PathBuf,
    pub base_path: BasePath,
}

impl BackendTarget {
    pub fn new(socket_path: impl Into<PathBuf>, base_path: BasePath) -> Self {
        Self {
            socket_path: socket_path.into(),
            base_path,
        }
    }

    /// Build a target from configuration, resolving a relative base path
    /// against the current working directory.
    pub fn from_config(config: &BackendConfig) -> io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::new(
            config.socket_path.clone(),
            BasePath::resolve(&config.base_path, &cwd),
        ))
    }
}

/// A literal path prefix. Empty means "strip nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasePath(String);

impl BasePath {
    /// Resolve `raw` to an absolute, cleaned path. A result of `/` and an
    /// empty input both yield the empty prefix.
    pub fn resolve(raw: &str, cwd: &Path) -> Self {
        if raw.is_empty() {
            return Self::default();
        }

        let joined = if raw.starts_with('/') {
            PathBuf::from(raw)
        } else {
            cwd.join(raw)
        };

        let cleaned = clean(&joined);
        if cleaned == "/" {
            Self::default()
        } else {
            Self(cleaned)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove the prefix from `path` once, if `path` literally starts with it.
    ///
    /// No decoding or slash canonicalization: "/app" strips "/application"
    /// down to "lication".
    pub fn strip<'a>(&self, path: &'a str) -> &'a str {
        if self.0.is_empty() {
            return path;
        }
        path.strip_prefix(self.0.as_str()).unwrap_or(path)
    }
}

/// Lexical cleanup of an absolute path: drops `.`, resolves `..` without
/// touching the filesystem, collapses repeated and trailing slashes.
fn clean(path: &Path) -> String {
    let mut segments: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
            Component::ParentDir => {
                segments.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    format!("/{}", segments.join("/"))
}
