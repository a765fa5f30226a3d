//! Artifact lifecycle managers ("class file managers").
//!
//! A manager hears about every artifact the compiler front-end writes or
//! removes during one compilation attempt. When the attempt ends it either
//! commits them or puts the output directory back the way it was.
//!
//! Built-in policies:
//! - [`TransactionalManager`]: backs up anything it is about to lose and
//!   restores it byte-for-byte on failure.
//! - [`ImmediateDeleteManager`]: keeps no backups and deletes what the
//!   attempt produced on failure.
//!
//! Managers are combined with [`ManagerChain`].

pub mod chain;
pub mod immediate;
pub mod policy;
pub mod recording;
pub mod state;
pub mod transactional;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::ManagerError;

pub use chain::{ManagerChain, MemberCompletions};
pub use immediate::ImmediateDeleteManager;
pub use policy::LifecyclePolicy;
pub use recording::{EventLog, ManagerEvent, RecordingManager};
pub use state::AttemptState;
pub use transactional::TransactionalManager;

/// Receives artifact lifecycle calls for one compilation attempt.
///
/// The front-end may call the `notify_*` methods from several threads at
/// once; implementations serialize their own bookkeeping. After
/// [`complete`](ClassFileManager::complete) the built-in managers reject any
/// further call with [`ManagerError::ContractViolation`].
pub trait ClassFileManager: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str {
        "external"
    }

    /// The front-end is about to write `path`.
    fn notify_generated(&self, path: &Path) -> Result<(), ManagerError>;

    /// The artifact at `path` is stale and must go.
    ///
    /// The manager removes the file itself, after saving a backup when its
    /// policy keeps one.
    fn notify_deleted(&self, path: &Path) -> Result<(), ManagerError>;

    /// End the attempt: commit on success, roll back on failure.
    fn complete(&self, success: bool) -> Result<Completion, ManagerError>;
}

/// How an attempt ended, from one manager's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The attempt succeeded; these paths now belong to the build.
    Committed {
        generated: BTreeSet<PathBuf>,
        deleted: BTreeSet<PathBuf>,
    },

    /// The attempt failed and the output directory was put back.
    RolledBack {
        restored: BTreeSet<PathBuf>,
        removed: BTreeSet<PathBuf>,
    },
}

impl Completion {
    pub fn is_committed(&self) -> bool {
        matches!(self, Completion::Committed { .. })
    }

    /// A commit with nothing in it.
    pub fn empty_commit() -> Self {
        Completion::Committed {
            generated: BTreeSet::new(),
            deleted: BTreeSet::new(),
        }
    }

    /// A rollback that had nothing to undo.
    pub fn empty_rollback() -> Self {
        Completion::RolledBack {
            restored: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }
}
