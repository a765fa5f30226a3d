//! Per-attempt state machine and artifact bookkeeping shared by the
//! built-in managers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ManagerError;

/// Where an attempt is in its lifecycle.
///
/// `Idle -> Recording -> {Committed | RolledBack}`. The first notification
/// starts recording; `complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptState {
    #[default]
    Idle,
    Recording,
    Committed,
    RolledBack,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::Idle => write!(f, "idle"),
            AttemptState::Recording => write!(f, "recording"),
            AttemptState::Committed => write!(f, "committed"),
            AttemptState::RolledBack => write!(f, "rolled back"),
        }
    }
}

impl AttemptState {
    pub fn is_finished(self) -> bool {
        matches!(self, AttemptState::Committed | AttemptState::RolledBack)
    }

    /// Accept a notification, moving `Idle` to `Recording`.
    pub fn begin(&mut self, manager: &str, operation: &'static str) -> Result<(), ManagerError> {
        if self.is_finished() {
            return Err(self.violation(manager, operation));
        }
        *self = AttemptState::Recording;
        Ok(())
    }

    /// Accept the single terminal call.
    ///
    /// Completing an idle attempt is allowed: a compile that emitted nothing
    /// still has to be committed or rolled back.
    pub fn finish(&mut self, manager: &str, success: bool) -> Result<(), ManagerError> {
        if self.is_finished() {
            return Err(self.violation(manager, "complete"));
        }
        *self = if success {
            AttemptState::Committed
        } else {
            AttemptState::RolledBack
        };
        Ok(())
    }

    fn violation(self, manager: &str, operation: &'static str) -> ManagerError {
        ManagerError::ContractViolation {
            manager: manager.to_string(),
            operation,
            state: self,
        }
    }
}

/// The last thing the front-end said about an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Generated,
    Deleted,
}

/// An artifact a manager heard about during the current attempt.
#[derive(Debug, Clone)]
pub struct TrackedArtifact {
    pub path: PathBuf,

    /// Set once the front-end reports writing the path, and never cleared
    pub produced_in_this_attempt: bool,

    /// Whether a file was at the path before the first notification
    pub existed_before: bool,

    /// Saved copy of the pre-attempt bytes (transactional policy only)
    pub backup: Option<PathBuf>,

    pub fate: Fate,
}

/// Artifacts tracked during one attempt, keyed by path.
#[derive(Debug, Default)]
pub struct Ledger {
    artifacts: BTreeMap<PathBuf, TrackedArtifact>,
}

impl Ledger {
    pub fn get(&self, path: &Path) -> Option<&TrackedArtifact> {
        self.artifacts.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut TrackedArtifact> {
        self.artifacts.get_mut(path)
    }

    /// Start tracking a path seen for the first time.
    pub fn insert(&mut self, artifact: TrackedArtifact) -> &mut TrackedArtifact {
        let path = artifact.path.clone();
        self.artifacts.entry(path).or_insert(artifact)
    }

    /// Existing entry for `path`, or a new one built by `init`.
    pub fn entry_or_insert_with(
        &mut self,
        path: &Path,
        init: impl FnOnce() -> TrackedArtifact,
    ) -> &mut TrackedArtifact {
        self.artifacts.entry(path.to_path_buf()).or_insert_with(init)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedArtifact> {
        self.artifacts.values()
    }

    /// Paths whose final fate is `fate`.
    pub fn with_fate(&self, fate: Fate) -> std::collections::BTreeSet<PathBuf> {
        self.artifacts
            .values()
            .filter(|a| a.fate == fate)
            .map(|a| a.path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
