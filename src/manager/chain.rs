//! Ordered fan-out over several managers.
//!
//! The members are an explicit list: externally attached managers in attach
//! order, then the host's internal manager. Every call goes to every member
//! in that order. One member failing does not stop the rest, so rollback is
//! attempted everywhere; the first failure is returned once all members ran.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error};

use crate::error::ManagerError;
use crate::manager::state::AttemptState;
use crate::manager::{ClassFileManager, Completion};

const NAME: &str = "chain";

/// What [`ManagerChain::complete_members`] saw.
#[derive(Debug)]
pub struct MemberCompletions {
    /// The last member's result
    pub last: Result<Completion, ManagerError>,

    /// Failures of the members before it, in invocation order
    pub earlier_failures: Vec<ManagerError>,
}

/// Broadcasts lifecycle calls to its members in a fixed order.
pub struct ManagerChain {
    members: Vec<Arc<dyn ClassFileManager>>,
    // Notifications hold the read side while broadcasting; `complete` holds
    // the write side, so it never interleaves with a notification.
    state: RwLock<AttemptState>,
}

impl ManagerChain {
    /// External managers first, in order, then the internal one.
    pub fn new(
        externals: impl IntoIterator<Item = Arc<dyn ClassFileManager>>,
        internal: Arc<dyn ClassFileManager>,
    ) -> Self {
        let mut members: Vec<_> = externals.into_iter().collect();
        members.push(internal);
        Self::from_members(members)
    }

    /// A chain over exactly these members, in this order.
    pub fn from_members(members: Vec<Arc<dyn ClassFileManager>>) -> Self {
        ManagerChain {
            members,
            state: RwLock::new(AttemptState::Idle),
        }
    }

    /// Members in invocation order.
    pub fn members(&self) -> &[Arc<dyn ClassFileManager>] {
        &self.members
    }

    /// Member names in invocation order.
    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name()).collect()
    }

    /// Complete every member, keeping the last member's result apart from
    /// the failures of the members before it.
    ///
    /// A host uses this when the last member's commit decides what is on
    /// disk and the other members only observe.
    pub fn complete_members(&self, success: bool) -> Result<MemberCompletions, ManagerError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.finish(NAME, success)?;

        let mut earlier_failures = Vec::new();
        let mut last = Ok(if success {
            Completion::empty_commit()
        } else {
            Completion::empty_rollback()
        });

        let count = self.members.len();
        for (i, member) in self.members.iter().enumerate() {
            let result = member.complete(success);
            match &result {
                Ok(_) => debug!(manager = member.name(), success, "member completed"),
                Err(e) => error!(manager = member.name(), "{}", e),
            }
            if i + 1 == count {
                last = result;
            } else if let Err(e) = result {
                earlier_failures.push(e);
            }
        }

        Ok(MemberCompletions {
            last,
            earlier_failures,
        })
    }

    pub fn state(&self) -> AttemptState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_all(
        &self,
        operation: &'static str,
        call: impl Fn(&dyn ClassFileManager) -> Result<(), ManagerError>,
    ) -> Result<(), ManagerError> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .begin(NAME, operation)?;

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        // `complete` may have slipped in between the two locks.
        if state.is_finished() {
            return Err(ManagerError::ContractViolation {
                manager: NAME.to_string(),
                operation,
                state: *state,
            });
        }

        let mut first_error = None;
        for member in &self.members {
            if let Err(e) = call(member.as_ref()) {
                record_failure(&mut first_error, member.name(), e);
            }
        }
        drop(state);

        first_error.map_or(Ok(()), Err)
    }
}

fn record_failure(first: &mut Option<ManagerError>, member: &str, err: ManagerError) {
    if first.is_none() {
        error!(manager = member, "{}", err);
        *first = Some(err);
    } else {
        error!(manager = member, "additional failure: {}", err);
    }
}

impl ClassFileManager for ManagerChain {
    fn name(&self) -> &str {
        NAME
    }

    fn notify_generated(&self, path: &Path) -> Result<(), ManagerError> {
        self.notify_all("notify_generated", |m| m.notify_generated(path))
    }

    fn notify_deleted(&self, path: &Path) -> Result<(), ManagerError> {
        self.notify_all("notify_deleted", |m| m.notify_deleted(path))
    }

    /// Completes every member and reports the last member's view, which is
    /// the internal manager for chains built with [`ManagerChain::new`].
    /// Any failure wins over that view; the first one is returned.
    fn complete(&self, success: bool) -> Result<Completion, ManagerError> {
        let MemberCompletions {
            last,
            earlier_failures,
        } = self.complete_members(success)?;
        match earlier_failures.into_iter().next() {
            Some(first) => Err(first),
            None => last,
        }
    }
}
