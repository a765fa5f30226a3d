//! Transactional artifact manager.
//!
//! Before the first change to a path during an attempt, any file already
//! there is saved into a private backup directory. A failed attempt restores
//! every saved file, deletes every new one, and removes the directories it
//! had to create for them, so the tracked paths end up byte-for-byte as they
//! were before the attempt.
//!
//! Each attempt keeps its backups in its own subdirectory of the backup
//! root. Completing an attempt removes only that subdirectory; backups a
//! crashed earlier attempt left behind stay where they are.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::Builder;
use tracing::{debug, error, info, warn};

use crate::error::{ManagerError, RollbackAction, RollbackFailure};
use crate::manager::state::{AttemptState, Fate, Ledger, TrackedArtifact};
use crate::manager::{ClassFileManager, Completion};
use crate::util::fs::{move_file, remove_dir_all_if_exists, remove_file_if_exists};

const NAME: &str = "transactional";

/// Backs up artifacts before they change and restores them on failure.
pub struct TransactionalManager {
    backup_dir: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    state: AttemptState,
    ledger: Ledger,
    next_backup: usize,
    /// This attempt's backup subdirectory, created on the first backup
    attempt_dir: Option<PathBuf>,
    /// Directories missing when a new artifact was announced
    created_dirs: BTreeSet<PathBuf>,
}

impl TransactionalManager {
    /// Create a manager that keeps its backups under `backup_dir`.
    ///
    /// The attempt's own subdirectory is created on the first backup and
    /// removed when the attempt completes. `backup_dir` itself is removed
    /// only when nothing else is left in it.
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        TransactionalManager {
            backup_dir: backup_dir.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AttemptState {
        self.lock().state
    }

    /// This attempt's backup subdirectory, once something was backed up.
    pub fn attempt_dir(&self) -> Option<PathBuf> {
        self.lock().attempt_dir.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking front-end thread must not make rollback impossible.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_attempt_dir(&self, inner: &mut Inner) -> Result<PathBuf, ManagerError> {
        if let Some(dir) = &inner.attempt_dir {
            return Ok(dir.clone());
        }

        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| Self::io_error("create backup directory", &self.backup_dir, e))?;
        let dir = Builder::new()
            .prefix("attempt-")
            .keep(true)
            .tempdir_in(&self.backup_dir)
            .map_err(|e| Self::io_error("create backup directory in", &self.backup_dir, e))?
            .path()
            .to_path_buf();
        debug!(dir = %dir.display(), "created attempt backup directory");
        inner.attempt_dir = Some(dir.clone());
        Ok(dir)
    }

    fn backup_path(&self, inner: &mut Inner, original: &Path) -> Result<PathBuf, ManagerError> {
        let dir = self.ensure_attempt_dir(inner)?;
        let index = inner.next_backup;
        inner.next_backup += 1;

        let file_name = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        Ok(dir.join(format!("{:06}-{}", index, file_name)))
    }

    /// Remember the ancestors of `path` that do not exist yet.
    fn note_missing_dirs(inner: &mut Inner, path: &Path) {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current.as_os_str().is_empty() || current.exists() {
                break;
            }
            inner.created_dirs.insert(current.to_path_buf());
            dir = current.parent();
        }
    }

    /// Remove this attempt's backups, then the backup root if it is empty.
    fn discard_backups(&self, inner: &Inner) -> Result<(), ManagerError> {
        if let Some(dir) = &inner.attempt_dir {
            remove_dir_all_if_exists(dir).map_err(|e| ManagerError::Io {
                manager: NAME.to_string(),
                action: "discard backups in",
                path: dir.clone(),
                source: io::Error::other(format!("{:#}", e)),
            })?;
        }
        // Fails while an earlier attempt's leftovers are still in there.
        let _ = fs::remove_dir(&self.backup_dir);
        Ok(())
    }

    /// Remove directories created for new artifacts, deepest first. A
    /// directory something else has written into is left alone.
    fn remove_created_dirs(inner: &Inner) -> BTreeSet<PathBuf> {
        let mut dirs: Vec<&PathBuf> = inner.created_dirs.iter().collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));

        let mut removed = BTreeSet::new();
        for dir in dirs {
            if fs::remove_dir(dir).is_ok() {
                removed.insert(dir.clone());
            }
        }
        removed
    }

    fn io_error(action: &'static str, path: &Path, source: io::Error) -> ManagerError {
        ManagerError::Io {
            manager: NAME.to_string(),
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Start tracking `path`, saving its current bytes first.
    ///
    /// `take` moves the file into the backup directory instead of copying
    /// it, which is how a deletion is carried out.
    fn track(
        &self,
        inner: &mut Inner,
        path: &Path,
        fate: Fate,
        take: bool,
    ) -> Result<(), ManagerError> {
        let existed_before = fs::symlink_metadata(path).is_ok();

        let backup = if existed_before {
            let backup = self.backup_path(inner, path)?;

            if take {
                move_file(path, &backup).map_err(|e| Self::io_error("back up", path, e))?;
            } else {
                fs::copy(path, &backup).map_err(|e| Self::io_error("back up", path, e))?;
            }
            debug!(
                artifact = %path.display(),
                backup = %backup.display(),
                "saved pre-attempt artifact"
            );
            Some(backup)
        } else {
            Self::note_missing_dirs(inner, path);
            None
        };

        inner.ledger.insert(TrackedArtifact {
            path: path.to_path_buf(),
            produced_in_this_attempt: false,
            existed_before,
            backup,
            fate,
        });
        Ok(())
    }

    /// The new artifacts are already in place, so a backup that cannot be
    /// discarded does not fail the commit. It stays behind for
    /// `drydock clean`.
    fn commit(&self, inner: &Inner) -> Result<Completion, ManagerError> {
        if let Err(e) = self.discard_backups(inner) {
            warn!("commit kept stale backups: {}", e);
        }

        let generated = inner.ledger.with_fate(Fate::Generated);
        let deleted = inner.ledger.with_fate(Fate::Deleted);
        info!(
            generated = generated.len(),
            deleted = deleted.len(),
            "committed artifacts"
        );
        Ok(Completion::Committed { generated, deleted })
    }

    fn rollback(&self, inner: &Inner) -> Result<Completion, ManagerError> {
        let mut restored = BTreeSet::new();
        let mut removed = BTreeSet::new();
        let mut failures = Vec::new();

        for artifact in inner.ledger.iter() {
            if let Some(backup) = &artifact.backup {
                match move_file(backup, &artifact.path) {
                    Ok(()) => {
                        restored.insert(artifact.path.clone());
                    }
                    Err(e) => failures.push(RollbackFailure {
                        path: artifact.path.clone(),
                        action: RollbackAction::Restore,
                        reason: e.to_string(),
                    }),
                }
            } else if artifact.produced_in_this_attempt {
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
        }

        if failures.is_empty() {
            let dirs = Self::remove_created_dirs(inner);
            debug!(dirs = dirs.len(), "removed directories created by the attempt");
        }

        // Backups that could not be restored are the only copy left.
        if failures.is_empty() {
            if let Err(e) = self.discard_backups(inner) {
                failures.push(RollbackFailure {
                    path: inner.attempt_dir.clone().unwrap_or_else(|| self.backup_dir.clone()),
                    action: RollbackAction::DiscardBackups,
                    reason: e.to_string(),
                });
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

        info!(
            restored = restored.len(),
            removed = removed.len(),
            "rolled back artifacts"
        );
        Ok(Completion::RolledBack { restored, removed })
    }
}

impl ClassFileManager for TransactionalManager {
    fn name(&self) -> &str {
        NAME
    }

    fn notify_generated(&self, path: &Path) -> Result<(), ManagerError> {
        let mut inner = self.lock();
        inner.state.begin(NAME, "notify_generated")?;

        // Check-and-backup happens under the lock, so two threads writing
        // the same path cannot both decide it needs saving.
        if inner.ledger.get(path).is_none() {
            self.track(&mut inner, path, Fate::Generated, false)?;
        }
        if let Some(artifact) = inner.ledger.get_mut(path) {
            artifact.produced_in_this_attempt = true;
            artifact.fate = Fate::Generated;
        }
        Ok(())
    }

    fn notify_deleted(&self, path: &Path) -> Result<(), ManagerError> {
        let mut inner = self.lock();
        inner.state.begin(NAME, "notify_deleted")?;

        if inner.ledger.get(path).is_none() {
            self.track(&mut inner, path, Fate::Deleted, true)?;
            return Ok(());
        }

        // Already saved (or never existed): just make it go away.
        remove_file_if_exists(path).map_err(|e| Self::io_error("delete", path, e))?;
        if let Some(artifact) = inner.ledger.get_mut(path) {
            artifact.fate = Fate::Deleted;
        }
        Ok(())
    }

    fn complete(&self, success: bool) -> Result<Completion, ManagerError> {
        let mut inner = self.lock();
        inner.state.finish(NAME, success)?;

        if success {
            self.commit(&inner)
        } else {
            self.rollback(&inner)
        }
    }
}
