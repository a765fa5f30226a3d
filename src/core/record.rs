//! The prior build record: what the last successful build knew.
//!
//! Records are immutable. A successful round derives the next record through
//! [`RecordBuilder`] and the host swaps it in wholesale.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::files::{BinaryFile, ProductFile, SourceFile};
use crate::core::fingerprint::FileFingerprint;
use crate::util::fs::write_atomic;
use crate::util::hash::ContentHash;

/// Snapshot of the previous successful build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorBuildRecord {
    /// Content hash of every source compiled into the build
    sources: BTreeMap<SourceFile, ContentHash>,

    /// Content hash of every classpath binary the build read
    binaries: BTreeMap<BinaryFile, ContentHash>,

    /// Products emitted per source
    products: BTreeMap<SourceFile, BTreeSet<ProductFile>>,

    /// Class names defined per source
    classes: BTreeMap<SourceFile, BTreeSet<String>>,

    /// Classpath fingerprints, in classpath order
    classpath: Vec<FileFingerprint>,
}

impl PriorBuildRecord {
    /// The record of a project that was never built.
    pub fn empty() -> Self {
        PriorBuildRecord::default()
    }

    /// Start a builder with no prior knowledge.
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// Start a builder seeded with this record's contents.
    pub fn to_builder(&self) -> RecordBuilder {
        RecordBuilder {
            record: self.clone(),
        }
    }

    /// Load a record from a JSON file. A missing file is an empty record.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(PriorBuildRecord::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read build record: {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse build record: {}", path.display()))?;
        Ok(record)
    }

    /// Save the record as pretty JSON, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("failed to serialize build record")?;
        write_atomic(path, content.as_bytes())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.binaries.is_empty() && self.products.is_empty()
    }

    /// Sources the prior build compiled, with their content hashes.
    pub fn known_sources(&self) -> &BTreeMap<SourceFile, ContentHash> {
        &self.sources
    }

    /// Classpath binaries the prior build read, with their content hashes.
    pub fn known_binaries(&self) -> &BTreeMap<BinaryFile, ContentHash> {
        &self.binaries
    }

    /// Every product of every source.
    pub fn known_products(&self) -> BTreeSet<ProductFile> {
        self.products.values().flatten().cloned().collect()
    }

    pub fn source_hash(&self, source: &SourceFile) -> Option<&ContentHash> {
        self.sources.get(source)
    }

    /// Products emitted for one source.
    pub fn products_of(&self, source: &SourceFile) -> Option<&BTreeSet<ProductFile>> {
        self.products.get(source)
    }

    /// The source that emitted `product`.
    pub fn owner_of(&self, product: &ProductFile) -> Option<&SourceFile> {
        self.products
            .iter()
            .find(|(_, products)| products.contains(product))
            .map(|(source, _)| source)
    }

    /// Class names defined by one source.
    pub fn classes_of(&self, source: &SourceFile) -> Option<&BTreeSet<String>> {
        self.classes.get(source)
    }

    /// Every class name the prior build defined.
    pub fn known_classes(&self) -> BTreeSet<String> {
        self.classes.values().flatten().cloned().collect()
    }

    /// Classpath fingerprints in classpath order.
    pub fn classpath(&self) -> &[FileFingerprint] {
        &self.classpath
    }
}

/// Derives a new [`PriorBuildRecord`] without touching the one it started from.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    record: PriorBuildRecord,
}

impl RecordBuilder {
    /// Record a compiled source and its content hash.
    pub fn source(mut self, source: SourceFile, hash: ContentHash) -> Self {
        self.record.sources.insert(source, hash);
        self
    }

    /// Forget a source along with its products and classes.
    pub fn remove_source(mut self, source: &SourceFile) -> Self {
        self.record.sources.remove(source);
        self.record.products.remove(source);
        self.record.classes.remove(source);
        self
    }

    /// Replace the products of a source.
    pub fn products(mut self, source: SourceFile, products: BTreeSet<ProductFile>) -> Self {
        if products.is_empty() {
            self.record.products.remove(&source);
        } else {
            self.record.products.insert(source, products);
        }
        self
    }

    /// Drop a product from whichever source owned it.
    pub fn remove_product(mut self, product: &ProductFile) -> Self {
        self.record.products.retain(|_, products| {
            products.remove(product);
            !products.is_empty()
        });
        self
    }

    /// Replace the class names a source defines.
    pub fn classes(mut self, source: SourceFile, classes: BTreeSet<String>) -> Self {
        if classes.is_empty() {
            self.record.classes.remove(&source);
        } else {
            self.record.classes.insert(source, classes);
        }
        self
    }

    /// Replace the whole set of known binaries.
    pub fn binaries(mut self, binaries: BTreeMap<BinaryFile, ContentHash>) -> Self {
        self.record.binaries = binaries;
        self
    }

    /// Replace the classpath fingerprints.
    pub fn classpath(mut self, classpath: Vec<FileFingerprint>) -> Self {
        self.record.classpath = classpath;
        self
    }

    pub fn build(self) -> PriorBuildRecord {
        self.record
    }
}
