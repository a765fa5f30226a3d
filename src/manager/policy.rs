//! Choosing the internal manager for a build.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::manager::{ClassFileManager, ImmediateDeleteManager, TransactionalManager};
use crate::util::config::{ClassFileManagerType, IncrementalOptions};

/// How the output directory is protected during an attempt.
#[derive(Clone)]
pub enum LifecyclePolicy {
    /// Back up, then restore on failure.
    Transactional { backup_dir: PathBuf },

    /// No backups; failure deletes what the attempt produced.
    ImmediateDelete,

    /// A caller-supplied manager takes the internal slot.
    Delegated(Arc<dyn ClassFileManager>),
}

impl fmt::Debug for LifecyclePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePolicy::Transactional { backup_dir } => f
                .debug_struct("Transactional")
                .field("backup_dir", backup_dir)
                .finish(),
            LifecyclePolicy::ImmediateDelete => write!(f, "ImmediateDelete"),
            LifecyclePolicy::Delegated(manager) => {
                f.debug_tuple("Delegated").field(&manager.name()).finish()
            }
        }
    }
}

impl LifecyclePolicy {
    /// The policy the options ask for. A transactional manager without an
    /// explicit backup directory keeps its backups in `state_dir/backup`.
    pub fn from_options(options: &IncrementalOptions, state_dir: &Path) -> Self {
        match &options.classfile_manager {
            ClassFileManagerType::Transactional { backup_dir } => LifecyclePolicy::Transactional {
                backup_dir: backup_dir
                    .clone()
                    .unwrap_or_else(|| state_dir.join("backup")),
            },
            ClassFileManagerType::DeleteImmediately => LifecyclePolicy::ImmediateDelete,
        }
    }

    /// A fresh manager for one attempt.
    ///
    /// Built-in managers are single-use, so each call returns a new one. A
    /// delegated manager is shared as-is.
    pub fn instantiate(&self) -> Arc<dyn ClassFileManager> {
        match self {
            LifecyclePolicy::Transactional { backup_dir } => {
                Arc::new(TransactionalManager::new(backup_dir.clone()))
            }
            LifecyclePolicy::ImmediateDelete => Arc::new(ImmediateDeleteManager::new()),
            LifecyclePolicy::Delegated(manager) => Arc::clone(manager),
        }
    }
}

/// The internal manager the options select.
pub fn default_manager(options: &IncrementalOptions, state_dir: &Path) -> Arc<dyn ClassFileManager> {
    LifecyclePolicy::from_options(options, state_dir).instantiate()
}
