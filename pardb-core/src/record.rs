//! Per-path and per-digest records held by the index.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Metadata for one covered file, keyed by its path in the index.
///
/// Deserialisation rejects unknown fields: a record read back from a future
/// or corrupted index must fail loudly rather than silently dropping data
/// the running binary doesn't understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRecord {
    /// Relative to the scan root, forward-slash normalized.
    pub path: String,
    /// Empty until the file has been hashed at least once.
    pub digest: String,
    pub mtime: f64,
    pub size: u64,
}

impl FileRecord {
    pub fn new(path: String, mtime: f64, size: u64) -> Self {
        Self { path, digest: String::new(), mtime, size }
    }

    pub fn full_path(&self, root: &Path) -> PathBuf {
        root.join(&self.path)
    }

    pub fn parent(&self, root: &Path) -> PathBuf {
        self.full_path(root).parent().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf())
    }

    pub fn has_digest(&self) -> bool {
        !self.digest.is_empty() && self.digest != crate::hash::IO_ERROR_SENTINEL
    }
}

/// One entry in the parity vault: every artifact installed for a given file
/// digest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultEntry {
    pub file_digest: String,
    /// `(artifact_name, artifact_digest)`, insertion order preserved.
    pub artifacts: Vec<(String, String)>,
}

impl VaultEntry {
    pub fn new(file_digest: impl Into<String>) -> Self {
        Self { file_digest: file_digest.into(), artifacts: Vec::new() }
    }
}
