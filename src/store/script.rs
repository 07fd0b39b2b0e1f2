//! Script handles: the atomic decision logic shipped to the score store.
//!
//! Each algorithm has one Lua source file, read once at startup from a
//! configurable directory. The handle pairs the source text with its SHA-1
//! digest so the store can prefer digest-based evaluation and fall back to
//! the full text on a digest miss.

use sha1::{Digest, Sha1};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading script files at startup.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Failed to read a script file.
    #[error("failed to read script file '{path}': {source}")]
    ReadError {
        /// Path to the script file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Script file was empty.
    #[error("script file '{path}' is empty")]
    Empty {
        /// Path to the script file.
        path: PathBuf,
    },
}

/// Opaque handle to one algorithm's script.
///
/// Limiters hold a handle and pass it to the store; whether the store sends
/// the digest or the full text is a transport detail.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    name: String,
    text: String,
    digest: String,
}

impl ScriptHandle {
    /// Create a handle from in-memory source text.
    #[must_use]
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let digest = sha1_hex(&text);
        Self {
            name: name.into(),
            text,
            digest,
        }
    }

    /// Load `<dir>/<name>.lua`.
    pub fn load(dir: &Path, name: &str) -> Result<Self, ScriptError> {
        let path = dir.join(format!("{name}.lua"));
        let text = std::fs::read_to_string(&path).map_err(|source| ScriptError::ReadError {
            path: path.clone(),
            source,
        })?;
        if text.trim().is_empty() {
            return Err(ScriptError::Empty { path });
        }
        Ok(Self::new(name, text))
    }

    /// Algorithm name this script belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full script source text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Lowercase hex SHA-1 digest of the source text.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

fn sha1_hex(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
