//! The lookup protocol: where a round gets its change information.
//!
//! A [`Lookup`] answers five questions about the project. Each answer is
//! independent. Returning `Ok(None)` *defers* to the built-in filesystem
//! detection for that one question; returning `Ok(Some(..))` is
//! authoritative and complete, and no detection runs for that question.
//!
//! Every method has a deferring default, so an IDE that knows which files
//! the user edited only overrides [`Lookup::changed_sources`] and leaves the
//! rest alone. [`DefaultLookup`] overrides nothing.

pub mod detect;

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::core::change_set::ChangeSet;
use crate::core::files::{BinaryFile, ProductFile, SourceFile};
use crate::core::fingerprint::FileFingerprint;
use crate::core::record::PriorBuildRecord;
use crate::error::LookupError;

pub use detect::{ChangeDetector, FsChangeDetector, ProjectInputs};

/// Change information supplied from outside the compiler.
pub trait Lookup: Send + Sync {
    /// Source changes since `prior`.
    fn changed_sources(
        &self,
        _prior: &PriorBuildRecord,
    ) -> Result<Option<ChangeSet<SourceFile>>, LookupError> {
        Ok(None)
    }

    /// Classpath binaries that differ from `prior`.
    fn changed_binaries(
        &self,
        _prior: &PriorBuildRecord,
    ) -> Result<Option<BTreeSet<BinaryFile>>, LookupError> {
        Ok(None)
    }

    /// Previously generated products that are gone.
    fn removed_products(
        &self,
        _prior: &PriorBuildRecord,
    ) -> Result<Option<BTreeSet<ProductFile>>, LookupError> {
        Ok(None)
    }

    /// Veto point: `false` turns the round into a full rebuild.
    fn should_run_incremental(
        &self,
        _changed_classes: &BTreeSet<String>,
        _prior: &PriorBuildRecord,
    ) -> Result<bool, LookupError> {
        Ok(true)
    }

    /// Fingerprints for `entries`, one per entry and in the same order.
    fn classpath_fingerprints(
        &self,
        _entries: &[PathBuf],
    ) -> Result<Option<Vec<FileFingerprint>>, LookupError> {
        Ok(None)
    }
}

/// The lookup used when nothing is attached: defers everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLookup;

impl Lookup for DefaultLookup {}
