//! drydock - invalidation and artifact lifecycle core for incremental compilers
//!
//! This crate decides what an incremental build must recompile and keeps the
//! output directory trustworthy while the compiler front-end runs:
//! - [`lookup`]: where change information comes from, with per-question
//!   fallback to filesystem detection
//! - [`manager`]: class file managers that commit or roll back an attempt
//! - [`hooks`]: externally supplied lookups and managers
//! - [`ops::round`]: one round, from change detection to the next record

pub mod core;
pub mod error;
pub mod hooks;
pub mod lookup;
pub mod manager;
pub mod ops;
pub mod util;

/// Test utilities and mocks for drydock unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted lookup, a counting detector, a
/// failing manager, and output-directory fixtures.
#[cfg(test)]
pub mod test_support;

pub use core::{ChangeSet, FileFingerprint, PriorBuildRecord, SourceFile};
pub use error::{LookupError, ManagerError, RoundError};
pub use hooks::ExternalHooks;
pub use lookup::{DefaultLookup, Lookup};
pub use manager::{ClassFileManager, Completion, LifecyclePolicy};
pub use ops::round::{Round, RoundOutcome};
pub use util::config::IncrementalOptions;
