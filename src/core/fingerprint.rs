//! Classpath entry fingerprints.
//!
//! A fingerprint lets the host recognize an unchanged upstream entry without
//! re-reading its dependency metadata.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::util::hash::ContentHash;

/// Path plus content hash of one classpath entry.
///
/// Equality and hashing look only at the content hash: the same jar moved
/// to a different cache directory is still the same input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Where the entry was read from
    pub path: PathBuf,

    /// Content hash of the entry
    pub content_hash: ContentHash,
}

impl FileFingerprint {
    /// Create a fingerprint from known parts.
    pub fn new(path: impl Into<PathBuf>, content_hash: ContentHash) -> Self {
        FileFingerprint {
            path: path.into(),
            content_hash,
        }
    }

    /// Fingerprint a file or class directory on disk.
    pub fn of(path: &Path) -> Result<Self> {
        Ok(FileFingerprint {
            path: path.to_path_buf(),
            content_hash: ContentHash::of_path(path)?,
        })
    }
}

impl PartialEq for FileFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash
    }
}

impl Eq for FileFingerprint {}

impl Hash for FileFingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.content_hash.hash(state);
    }
}
