//! A manager that only observes.
//!
//! Integrators attach one of these to learn which artifacts a build touched
//! (an IDE refreshing its view, coverage tooling re-instrumenting outputs)
//! without taking part in rollback. Several recorders can share one
//! [`EventLog`], which then shows the exact order in which a chain invoked
//! its members.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::ManagerError;
use crate::manager::{ClassFileManager, Completion};

/// What a recorder saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    Generated { manager: String, path: PathBuf },
    Deleted { manager: String, path: PathBuf },
    Completed { manager: String, success: bool },
}

impl ManagerEvent {
    /// Name of the recorder that saw the event.
    pub fn manager(&self) -> &str {
        match self {
            ManagerEvent::Generated { manager, .. }
            | ManagerEvent::Deleted { manager, .. }
            | ManagerEvent::Completed { manager, .. } => manager,
        }
    }
}

/// Ordered, shareable list of events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ManagerEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ManagerEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: ManagerEvent) {
        self.lock().push(event);
    }

    /// Copy of every event so far.
    pub fn events(&self) -> Vec<ManagerEvent> {
        self.lock().clone()
    }

    /// Recorder names in the order they saw events.
    pub fn order(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.manager().to_string()).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Records every call it receives and never fails.
pub struct RecordingManager {
    name: String,
    log: EventLog,
    pending: Mutex<Pending>,
}

#[derive(Default)]
struct Pending {
    generated: BTreeSet<PathBuf>,
    deleted: BTreeSet<PathBuf>,
}

impl RecordingManager {
    /// A recorder with its own log.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_log(name, EventLog::new())
    }

    /// A recorder writing into a shared log.
    pub fn with_log(name: impl Into<String>, log: EventLog) -> Self {
        RecordingManager {
            name: name.into(),
            log,
            pending: Mutex::new(Pending::default()),
        }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClassFileManager for RecordingManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify_generated(&self, path: &Path) -> Result<(), ManagerError> {
        let mut pending = self.pending();
        pending.deleted.remove(path);
        pending.generated.insert(path.to_path_buf());
        self.log.push(ManagerEvent::Generated {
            manager: self.name.clone(),
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn notify_deleted(&self, path: &Path) -> Result<(), ManagerError> {
        let mut pending = self.pending();
        pending.generated.remove(path);
        pending.deleted.insert(path.to_path_buf());
        self.log.push(ManagerEvent::Deleted {
            manager: self.name.clone(),
            path: path.to_path_buf(),
        });
        Ok(())
    }

    /// Reports what it saw and resets, so one recorder can observe many
    /// attempts.
    fn complete(&self, success: bool) -> Result<Completion, ManagerError> {
        let Pending { generated, deleted } = std::mem::take(&mut *self.pending());
        self.log.push(ManagerEvent::Completed {
            manager: self.name.clone(),
            success,
        });

        Ok(if success {
            Completion::Committed { generated, deleted }
        } else {
            Completion::empty_rollback()
        })
    }
}
