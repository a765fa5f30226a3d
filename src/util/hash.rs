//! Content hashing for sources, binaries, and classpath entries.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Lowercase hex SHA-256 of some content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a byte slice.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }

    /// Hash a file's contents, streaming.
    pub fn of_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

        let mut hasher = Sha256::new();
        feed(&mut hasher, file)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;

        Ok(ContentHash(hex::encode(hasher.finalize())))
    }

    /// Hash a file or a directory tree.
    ///
    /// Directories hash the sorted relative paths and contents of every file
    /// beneath them, so a class directory fingerprints like a jar.
    pub fn of_path(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Self::of_file(path);
        }

        let mut hasher = Sha256::new();
        let walker = WalkDir::new(path).sort_by_file_name().follow_links(false);
        for entry in walker {
            let entry = entry
                .with_context(|| format!("failed to walk directory: {}", path.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = crate::util::fs::relative_path(path, entry.path());
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update(b"\0");

            let file = File::open(entry.path()).with_context(|| {
                format!("failed to open file for hashing: {}", entry.path().display())
            })?;
            feed(&mut hasher, file)?;
            hasher.update(b"\0");
        }

        Ok(ContentHash(hex::encode(hasher.finalize())))
    }

    /// Stand-in for content nobody read.
    ///
    /// Never equal to a real digest, so detection in a later round reports
    /// the file as modified.
    pub fn unknown() -> Self {
        ContentHash(String::new())
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }

    /// Build from an existing hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        ContentHash(hex.into())
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn feed(hasher: &mut Sha256, file: File) -> Result<()> {
    let mut reader = BufReader::new(file);
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(())
}
