//! Immediate-delete artifact manager.
//!
//! Keeps no backups. Deletions happen on the spot, and a failed attempt
//! deletes everything it produced, including files it overwrote: their new
//! bytes are as untrusted as a brand-new artifact's. The host must treat
//! those artifacts' sources as invalidated on the next round.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info};

use crate::error::{ManagerError, RollbackAction, RollbackFailure};
use crate::manager::state::{AttemptState, Fate, Ledger, TrackedArtifact};
use crate::manager::{ClassFileManager, Completion};
use crate::util::fs::remove_file_if_exists;

const NAME: &str = "delete-immediately";

/// Deletes eagerly and rolls back by deleting.
#[derive(Default)]
pub struct ImmediateDeleteManager {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    state: AttemptState,
    ledger: Ledger,
}

impl ImmediateDeleteManager {
    pub fn new() -> Self {
        ImmediateDeleteManager::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AttemptState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track<'a>(inner: &'a mut Inner, path: &Path, fate: Fate) -> &'a mut TrackedArtifact {
        let artifact = inner
            .ledger
            .entry_or_insert_with(path, || TrackedArtifact {
                path: path.to_path_buf(),
                produced_in_this_attempt: false,
                existed_before: fs::symlink_metadata(path).is_ok(),
                backup: None,
                fate,
            });
        artifact.fate = fate;
        artifact
    }
}

impl ClassFileManager for ImmediateDeleteManager {
    fn name(&self) -> &str {
        NAME
    }

    fn notify_generated(&self, path: &Path) -> Result<(), ManagerError> {
        let mut inner = self.lock();
        inner.state.begin(NAME, "notify_generated")?;

        Self::track(&mut inner, path, Fate::Generated).produced_in_this_attempt = true;
        Ok(())
    }

    fn notify_deleted(&self, path: &Path) -> Result<(), ManagerError> {
        let mut inner = self.lock();
        inner.state.begin(NAME, "notify_deleted")?;

        Self::track(&mut inner, path, Fate::Deleted);
        if remove_file_if_exists(path).map_err(|source| ManagerError::Io {
            manager: NAME.to_string(),
            action: "delete",
            path: path.to_path_buf(),
            source,
        })? {
            debug!(artifact = %path.display(), "deleted stale artifact");
        }
        Ok(())
    }

    fn complete(&self, success: bool) -> Result<Completion, ManagerError> {
        let mut inner = self.lock();
        inner.state.finish(NAME, success)?;

        if success {
            return Ok(Completion::Committed {
                generated: inner.ledger.with_fate(Fate::Generated),
                deleted: inner.ledger.with_fate(Fate::Deleted),
            });
        }

        let mut removed = BTreeSet::new();
        let mut failures = Vec::new();
        for artifact in inner.ledger.iter().filter(|a| a.produced_in_this_attempt) {
            match remove_file_if_exists(&artifact.path) {
                Ok(true) => {
                    removed.insert(artifact.path.clone());
                }
                Ok(false) => {}
                Err(e) => failures.push(RollbackFailure {
                    path: artifact.path.clone(),
                    action: RollbackAction::Remove,
                    reason: e.to_string(),
                }),
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                error!("rollback: {}", failure);
            }
            return Err(ManagerError::PartialRollback {
                manager: NAME.to_string(),
                failures,
            });
        }

        info!(removed = removed.len(), "rolled back artifacts");
        Ok(Completion::RolledBack {
            restored: BTreeSet::new(),
            removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::OutputDirFixture;

    #[test]
    fn test_delete_is_immediate() {
        let fixture = OutputDirFixture::new();
        let stale = fixture.write("Stale.class", b"old");
        let manager = ImmediateDeleteManager::new();

        manager.notify_deleted(&stale).unwrap();
        assert!(!stale.exists());

        // Nothing to bring back on failure.
        let completion = manager.complete(false).unwrap();
        assert_eq!(completion, Completion::empty_rollback());
        assert!(!stale.exists());
    }

    #[test]
    fn test_rollback_deletes_everything_produced() {
        let fixture = OutputDirFixture::new();
        let overwritten = fixture.write("A.class", b"old");
        let manager = ImmediateDeleteManager::new();

        manager.notify_generated(&overwritten).unwrap();
        fixture.write("A.class", b"half written");
        let fresh = fixture.path("B.class");
        manager.notify_generated(&fresh).unwrap();
        fixture.write("B.class", b"new");

        match manager.complete(false).unwrap() {
            Completion::RolledBack { restored, removed } => {
                assert!(restored.is_empty());
                assert_eq!(removed.len(), 2);
            }
            other => panic!("expected rollback, got {:?}", other),
        }
        assert!(!overwritten.exists());
        assert!(!fresh.exists());
        assert!(!fixture.backup_dir().exists());
    }

    #[test]
    fn test_commit_reports_fates() {
        let fixture = OutputDirFixture::new();
        let a = fixture.path("A.class");
        let manager = ImmediateDeleteManager::new();

        manager.notify_generated(&a).unwrap();
        fixture.write("A.class", b"new");

        let completion = manager.complete(true).unwrap();
        assert_eq!(
            completion,
            Completion::Committed {
                generated: [a.clone()].into_iter().collect(),
                deleted: BTreeSet::new(),
            }
        );
        assert!(a.exists());
        assert_eq!(manager.state(), AttemptState::Committed);
    }

    #[test]
    fn test_notify_after_complete() {
        let manager = ImmediateDeleteManager::new();
        manager.complete(false).unwrap();
        assert!(manager
            .notify_deleted(Path::new("out/A.class"))
            .unwrap_err()
            .is_fatal());
    }
}
