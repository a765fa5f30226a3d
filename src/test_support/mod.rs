//! Test utilities and mocks for drydock unit tests.
//!
//! This module provides stand-ins for the pieces a round talks to: a
//! scripted [`Lookup`], a [`ChangeDetector`] that counts how often it is
//! consulted, and a [`ClassFileManager`] that fails on demand.
//!
//! # Example
//!
//! ```rust,ignore
//! use drydock::test_support::{CountingDetector, ScriptedLookup};
//!
//! #[test]
//! fn test_example() {
//!     let lookup = ScriptedLookup::new().with_binaries(BTreeSet::new());
//!     let detector = Arc::new(CountingDetector::new(root));
//!
//!     // Run a round, then check what was asked and detected...
//! }
//! ```

pub mod fixtures;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;

use crate::core::change_set::ChangeSet;
use crate::core::files::{BinaryFile, ProductFile, SourceFile};
use crate::core::fingerprint::FileFingerprint;
use crate::core::record::PriorBuildRecord;
use crate::error::{LookupError, LookupOperation, ManagerError};
use crate::lookup::{ChangeDetector, FsChangeDetector, Lookup, ProjectInputs};
use crate::manager::{ClassFileManager, Completion};
use crate::util::hash::ContentHash;

// Re-export fixtures for convenience
pub use fixtures::*;

/// Lookup with canned answers.
///
/// Unscripted questions defer. Every question asked is recorded, in order.
#[derive(Debug, Default)]
pub struct ScriptedLookup {
    sources: Option<ChangeSet<SourceFile>>,
    binaries: Option<BTreeSet<BinaryFile>>,
    removed_products: Option<BTreeSet<ProductFile>>,
    incremental: bool,
    classpath: Option<Vec<FileFingerprint>>,
    failing: Option<LookupOperation>,
    asked: Mutex<Vec<LookupOperation>>,
}

impl ScriptedLookup {
    /// A lookup that defers everything and allows incremental rounds.
    pub fn new() -> Self {
        ScriptedLookup {
            incremental: true,
            ..Default::default()
        }
    }

    /// A lookup that defers everything but vetoes incremental rounds.
    pub fn vetoing() -> Self {
        ScriptedLookup::default()
    }

    pub fn with_sources(mut self, sources: ChangeSet<SourceFile>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_binaries(mut self, binaries: BTreeSet<BinaryFile>) -> Self {
        self.binaries = Some(binaries);
        self
    }

    pub fn with_removed_products(mut self, products: BTreeSet<ProductFile>) -> Self {
        self.removed_products = Some(products);
        self
    }

    pub fn with_classpath(mut self, classpath: Vec<FileFingerprint>) -> Self {
        self.classpath = Some(classpath);
        self
    }

    /// Make one question fail with [`LookupError::Failed`].
    pub fn failing(mut self, operation: LookupOperation) -> Self {
        self.failing = Some(operation);
        self
    }

    /// Questions asked so far.
    pub fn asked(&self) -> Vec<LookupOperation> {
        self.asked.lock().unwrap().clone()
    }

    fn ask<T: Clone>(
        &self,
        operation: LookupOperation,
        answer: &Option<T>,
    ) -> std::result::Result<Option<T>, LookupError> {
        self.asked.lock().unwrap().push(operation);
        if self.failing == Some(operation) {
            return Err(LookupError::failed(operation, "scripted failure"));
        }
        Ok(answer.clone())
    }
}

impl Lookup for ScriptedLookup {
    fn changed_sources(
        &self,
        _prior: &PriorBuildRecord,
    ) -> std::result::Result<Option<ChangeSet<SourceFile>>, LookupError> {
        self.ask(LookupOperation::ChangedSources, &self.sources)
    }

    fn changed_binaries(
        &self,
        _prior: &PriorBuildRecord,
    ) -> std::result::Result<Option<BTreeSet<BinaryFile>>, LookupError> {
        self.ask(LookupOperation::ChangedBinaries, &self.binaries)
    }

    fn removed_products(
        &self,
        _prior: &PriorBuildRecord,
    ) -> std::result::Result<Option<BTreeSet<ProductFile>>, LookupError> {
        self.ask(LookupOperation::RemovedProducts, &self.removed_products)
    }

    fn should_run_incremental(
        &self,
        _changed_classes: &BTreeSet<String>,
        _prior: &PriorBuildRecord,
    ) -> std::result::Result<bool, LookupError> {
        let answer = self.ask(LookupOperation::ShouldRunIncremental, &Some(self.incremental))?;
        Ok(answer.unwrap_or(true))
    }

    fn classpath_fingerprints(
        &self,
        _entries: &[PathBuf],
    ) -> std::result::Result<Option<Vec<FileFingerprint>>, LookupError> {
        self.ask(LookupOperation::ClasspathFingerprints, &self.classpath)
    }
}

/// Filesystem detector that counts every call, detection and hashing alike.
pub struct CountingDetector {
    inner: FsChangeDetector,
    detections: AtomicUsize,
}

impl CountingDetector {
    pub fn new(root: &Path) -> Self {
        CountingDetector {
            inner: FsChangeDetector::new(root),
            detections: AtomicUsize::new(0),
        }
    }

    pub fn detections(&self) -> usize {
        self.detections.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.detections.fetch_add(1, Ordering::SeqCst);
    }
}

impl ChangeDetector for CountingDetector {
    fn changed_sources(
        &self,
        prior: &PriorBuildRecord,
        inputs: &ProjectInputs,
    ) -> Result<ChangeSet<SourceFile>> {
        self.count();
        self.inner.changed_sources(prior, inputs)
    }

    fn changed_binaries(
        &self,
        prior: &PriorBuildRecord,
        inputs: &ProjectInputs,
    ) -> Result<BTreeSet<BinaryFile>> {
        self.count();
        self.inner.changed_binaries(prior, inputs)
    }

    fn removed_products(
        &self,
        prior: &PriorBuildRecord,
        removed_sources: &BTreeSet<SourceFile>,
    ) -> Result<BTreeSet<ProductFile>> {
        self.count();
        self.inner.removed_products(prior, removed_sources)
    }

    fn classpath_fingerprints(&self, entries: &[PathBuf]) -> Result<Vec<FileFingerprint>> {
        self.count();
        self.inner.classpath_fingerprints(entries)
    }

    fn hash_source(&self, source: &SourceFile) -> Result<ContentHash> {
        self.count();
        self.inner.hash_source(source)
    }

    fn binary_hashes(&self, inputs: &ProjectInputs) -> Result<BTreeMap<BinaryFile, ContentHash>> {
        self.count();
        self.inner.binary_hashes(inputs)
    }
}

/// Where a [`FailingManager`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailAt {
    Notify,
    Complete,
}

/// External manager that reports a failure at a chosen point.
pub struct FailingManager {
    name: String,
    fail_at: FailAt,
}

impl FailingManager {
    /// Fails every notification.
    pub fn on_notify(name: impl Into<String>) -> Self {
        FailingManager {
            name: name.into(),
            fail_at: FailAt::Notify,
        }
    }

    /// Accepts notifications, then fails `complete`.
    pub fn on_complete(name: impl Into<String>) -> Self {
        FailingManager {
            name: name.into(),
            fail_at: FailAt::Complete,
        }
    }

    fn check(&self, at: FailAt, what: &str) -> std::result::Result<(), ManagerError> {
        if self.fail_at == at {
            Err(ManagerError::external(&self.name, format!("refused to {}", what)))
        } else {
            Ok(())
        }
    }
}

impl ClassFileManager for FailingManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify_generated(&self, _path: &Path) -> std::result::Result<(), ManagerError> {
        self.check(FailAt::Notify, "record a generated artifact")
    }

    fn notify_deleted(&self, _path: &Path) -> std::result::Result<(), ManagerError> {
        self.check(FailAt::Notify, "record a deleted artifact")
    }

    fn complete(&self, success: bool) -> std::result::Result<Completion, ManagerError> {
        self.check(FailAt::Complete, "complete")?;
        Ok(if success {
            Completion::empty_commit()
        } else {
            Completion::empty_rollback()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_lookup_records_questions() {
        let lookup = ScriptedLookup::new().with_binaries(BTreeSet::new());
        let prior = PriorBuildRecord::empty();

        assert!(lookup.changed_sources(&prior).unwrap().is_none());
        assert!(lookup.changed_binaries(&prior).unwrap().is_some());
        assert_eq!(
            lookup.asked(),
            vec![LookupOperation::ChangedSources, LookupOperation::ChangedBinaries]
        );
    }

    #[test]
    fn test_scripted_failure() {
        let lookup = ScriptedLookup::new().failing(LookupOperation::RemovedProducts);
        let err = lookup
            .removed_products(&PriorBuildRecord::empty())
            .unwrap_err();
        assert!(err.to_string().contains("removed-products"));
    }

    #[test]
    fn test_failing_manager() {
        let manager = FailingManager::on_complete("broken");
        manager.notify_generated(Path::new("A.class")).unwrap();
        let err = manager.complete(true).unwrap_err();
        assert_eq!(err.to_string(), "broken: refused to complete");
    }
}
