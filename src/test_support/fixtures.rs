//! Test fixtures for output-directory scenarios.
//!
//! [`OutputDirFixture`] gives each test a scratch output directory plus a
//! sibling backup directory, and can snapshot the output directory so a
//! test can assert that a rollback left it byte-for-byte unchanged.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

/// Scratch `out/` and `backup/` directories that vanish with the fixture.
pub struct OutputDirFixture {
    tmp: TempDir,
}

impl OutputDirFixture {
    /// Create the fixture with an empty output directory. The backup
    /// directory is left for the manager to create.
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("failed to create temp dir");
        fs::create_dir_all(tmp.path().join("out")).expect("failed to create out dir");
        OutputDirFixture { tmp }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn out_dir(&self) -> PathBuf {
        self.tmp.path().join("out")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.tmp.path().join("backup")
    }

    /// Absolute path of `rel` inside the output directory.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.out_dir().join(rel)
    }

    /// Write a file into the output directory, creating parents.
    pub fn write(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(&path, contents).expect("failed to write fixture file");
        path
    }

    /// Every file under the output directory with its bytes.
    ///
    /// Directories are not part of the snapshot: a rollback may leave an
    /// empty directory behind where a new artifact was removed.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let out = self.out_dir();
        WalkDir::new(&out)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(&out).unwrap_or(e.path()).to_path_buf();
                let bytes = fs::read(e.path()).expect("failed to read snapshot file");
                (rel, bytes)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_tracks_files_only() {
        let fixture = OutputDirFixture::new();
        fixture.write("a/B.class", b"b");
        fs::create_dir_all(fixture.path("empty")).unwrap();

        let snapshot = fixture.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[Path::new("a/B.class")], b"b".to_vec());
        assert!(!fixture.backup_dir().exists());
    }
}
