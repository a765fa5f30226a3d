//! Error types for lookups, artifact managers, and build rounds.
//!
//! Deferrals and vetoes are not errors and never show up here. What does
//! show up falls in two groups: failures the next round can recover from,
//! and failures that leave the output directory untrusted (see
//! [`RoundError::is_fatal`]).

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::manager::state::AttemptState;
use crate::util::diagnostic::{suggestions, Diagnostic as UserDiagnostic};

/// The five questions a round asks its lookup, in asking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOperation {
    ChangedSources,
    ChangedBinaries,
    RemovedProducts,
    ShouldRunIncremental,
    ClasspathFingerprints,
}

impl fmt::Display for LookupOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupOperation::ChangedSources => write!(f, "changed-sources"),
            LookupOperation::ChangedBinaries => write!(f, "changed-binaries"),
            LookupOperation::RemovedProducts => write!(f, "removed-products"),
            LookupOperation::ShouldRunIncremental => write!(f, "should-run-incremental"),
            LookupOperation::ClasspathFingerprints => write!(f, "classpath-fingerprints"),
        }
    }
}

/// An external lookup failed to answer.
///
/// A failing lookup is a broken integration, not a lack of information, so
/// the round aborts instead of treating the failure as a deferral.
#[derive(Debug, Error, Diagnostic)]
pub enum LookupError {
    #[error("lookup failed to answer {operation}: {message}")]
    #[diagnostic(code(drydock::lookup::failed))]
    Failed {
        operation: LookupOperation,
        message: String,
    },

    #[error("lookup returned {actual} classpath fingerprints for {expected} entries")]
    #[diagnostic(
        code(drydock::lookup::fingerprint_count),
        help("a classpath answer must fingerprint every entry, in order")
    )]
    FingerprintCount { expected: usize, actual: usize },
}

impl LookupError {
    /// Wrap an integration failure for one operation.
    pub fn failed(operation: LookupOperation, message: impl fmt::Display) -> Self {
        LookupError::Failed {
            operation,
            message: message.to_string(),
        }
    }
}

/// What a rollback step was trying to do when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackAction {
    Restore,
    Remove,
    DiscardBackups,
}

impl fmt::Display for RollbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackAction::Restore => write!(f, "restore"),
            RollbackAction::Remove => write!(f, "remove"),
            RollbackAction::DiscardBackups => write!(f, "discard backups in"),
        }
    }
}

/// One path a rollback could not put back.
#[derive(Debug, Clone)]
pub struct RollbackFailure {
    pub path: PathBuf,
    pub action: RollbackAction,
    pub reason: String,
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not {} {}: {}",
            self.action,
            self.path.display(),
            self.reason
        )
    }
}

/// A class file manager failed.
#[derive(Debug, Error, Diagnostic)]
pub enum ManagerError {
    /// Lifecycle calls arrived out of order.
    #[error("{manager}: {operation} called while the attempt is {state}")]
    #[diagnostic(
        code(drydock::manager::contract_violation),
        help("each attempt takes notifications, then exactly one `complete`")
    )]
    ContractViolation {
        manager: String,
        operation: &'static str,
        state: AttemptState,
    },

    /// Bookkeeping I/O failed before the attempt finished.
    #[error("{manager}: failed to {action} {}: {source}", .path.display())]
    #[diagnostic(code(drydock::manager::io))]
    Io {
        manager: String,
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rollback ran to the end but some paths could not be put back.
    #[error("{manager}: rollback left {} artifact(s) in an untrusted state", .failures.len())]
    #[diagnostic(
        code(drydock::manager::partial_rollback),
        help("clean the output directory and run a full build")
    )]
    PartialRollback {
        manager: String,
        failures: Vec<RollbackFailure>,
    },

    /// An externally supplied manager reported its own failure.
    #[error("{manager}: {message}")]
    #[diagnostic(code(drydock::manager::external))]
    External { manager: String, message: String },
}

impl ManagerError {
    /// Failure reported by an integrator's manager.
    pub fn external(manager: impl Into<String>, message: impl fmt::Display) -> Self {
        ManagerError::External {
            manager: manager.into(),
            message: message.to_string(),
        }
    }

    /// True when the output directory can no longer be trusted, or the
    /// caller broke the lifecycle protocol.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ManagerError::ContractViolation { .. } | ManagerError::PartialRollback { .. }
        )
    }
}

/// A build round could not finish.
#[derive(Debug, Error, Diagnostic)]
pub enum RoundError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lookup(#[from] LookupError),

    #[error("default detection failed for {operation}")]
    #[diagnostic(code(drydock::round::detection))]
    Detection {
        operation: LookupOperation,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Manager(#[from] ManagerError),

    /// The front-end itself crashed, as opposed to reporting a failed compile.
    #[error("compiler front-end aborted: {message}")]
    #[diagnostic(code(drydock::round::compiler_aborted))]
    CompilerAborted { message: String },
}

impl RoundError {
    pub(crate) fn detection(operation: LookupOperation, err: anyhow::Error) -> Self {
        RoundError::Detection {
            operation,
            source: err.into(),
        }
    }

    /// True when the build must stop rather than retry.
    pub fn is_fatal(&self) -> bool {
        match self {
            RoundError::Manager(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Render for the terminal.
    pub fn to_diagnostic(&self) -> UserDiagnostic {
        match self {
            RoundError::Lookup(e) => UserDiagnostic::error(e.to_string())
                .with_context("an external lookup is installed for this build")
                .with_suggestion("Check the tool that supplies change information"),
            RoundError::Detection { operation, source } => {
                UserDiagnostic::error(format!("could not detect {}", operation))
                    .with_context(source.to_string())
            }
            RoundError::Manager(ManagerError::PartialRollback { failures, .. }) => {
                let mut diag = UserDiagnostic::error(self.to_string());
                for failure in failures {
                    diag = diag.with_context(failure.to_string());
                }
                diag.with_suggestion(suggestions::UNTRUSTED_OUTPUT)
            }
            RoundError::Manager(e) => UserDiagnostic::error(e.to_string()),
            RoundError::CompilerAborted { .. } => UserDiagnostic::error(self.to_string())
                .with_suggestion("Re-run with --verbose for more details"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_error_display() {
        let err = LookupError::failed(LookupOperation::ChangedSources, "ide disconnected");
        let msg = err.to_string();
        assert!(msg.contains("changed-sources"));
        assert!(msg.contains("ide disconnected"));
    }

    #[test]
    fn test_contract_violation_is_fatal() {
        let err = ManagerError::ContractViolation {
            manager: "transactional".to_string(),
            operation: "complete",
            state: AttemptState::Committed,
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("complete called while the attempt is committed"));
        assert!(RoundError::from(err).is_fatal());
    }

    #[test]
    fn test_partial_rollback_diagnostic() {
        let err = RoundError::Manager(ManagerError::PartialRollback {
            manager: "transactional".to_string(),
            failures: vec![RollbackFailure {
                path: PathBuf::from("out/A.class"),
                action: RollbackAction::Restore,
                reason: "permission denied".to_string(),
            }],
        });
        assert!(err.is_fatal());

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("1 artifact(s)"));
        assert!(output.contains("could not restore out/A.class: permission denied"));
        assert!(output.contains("drydock clean"));
    }

    #[test]
    fn test_external_failure_is_not_fatal() {
        let err = ManagerError::external("coverage", "socket closed");
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "coverage: socket closed");
    }
}
