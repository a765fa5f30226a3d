//! High-level operations.
//!
//! This module contains the round orchestrator and the project-level
//! operations behind the `drydock` commands.

pub mod project;
pub mod round;

pub use project::{clean, format_status, record_baseline, status, Project, StatusReport};
pub use round::{
    AnsweredBy, CompileMode, CompileOutput, CompiledSource, DetectedChanges, FullRebuildReason,
    Invalidation, RecompilePlan, Round, RoundOutcome,
};
