//! Built-in change detection by content hashing.
//!
//! This is what a round falls back to whenever the lookup defers. Paths in
//! [`ProjectInputs`] and in the build record are resolved against the
//! detector's project root, so records stay valid when the project moves.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::core::change_set::ChangeSet;
use crate::core::files::{BinaryFile, ProductFile, SourceFile};
use crate::core::fingerprint::FileFingerprint;
use crate::core::record::PriorBuildRecord;
use crate::util::config::SourceConfig;
use crate::util::fs::{glob_files, relative_path};
use crate::util::hash::ContentHash;

/// The project's current inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectInputs {
    pub sources: BTreeSet<SourceFile>,
    pub binaries: BTreeSet<BinaryFile>,
    pub classpath: Vec<PathBuf>,
}

impl ProjectInputs {
    pub fn new(
        sources: impl IntoIterator<Item = SourceFile>,
        binaries: impl IntoIterator<Item = BinaryFile>,
        classpath: Vec<PathBuf>,
    ) -> Self {
        ProjectInputs {
            sources: sources.into_iter().collect(),
            binaries: binaries.into_iter().collect(),
            classpath,
        }
    }

    /// Find the inputs `config` describes under `root`, as root-relative paths.
    pub fn discover(root: &Path, config: &SourceConfig) -> Result<Self> {
        let sources = glob_files(root, &config.include)?
            .into_iter()
            .map(|p| SourceFile::new(relative_path(root, &p)));
        let binaries = glob_files(root, &config.binaries)?
            .into_iter()
            .map(|p| BinaryFile::new(relative_path(root, &p)));

        Ok(ProjectInputs::new(sources, binaries, config.classpath.clone()))
    }
}

/// Answers the lookup questions from the filesystem.
///
/// The round orchestrator only calls a detection method when the lookup
/// deferred the matching question; the hashing helpers are used to fold
/// the compiled inputs into the next build record.
pub trait ChangeDetector: Send + Sync {
    fn changed_sources(
        &self,
        prior: &PriorBuildRecord,
        inputs: &ProjectInputs,
    ) -> Result<ChangeSet<SourceFile>>;

    fn changed_binaries(
        &self,
        prior: &PriorBuildRecord,
        inputs: &ProjectInputs,
    ) -> Result<BTreeSet<BinaryFile>>;

    fn removed_products(
        &self,
        prior: &PriorBuildRecord,
        removed_sources: &BTreeSet<SourceFile>,
    ) -> Result<BTreeSet<ProductFile>>;

    fn classpath_fingerprints(&self, entries: &[PathBuf]) -> Result<Vec<FileFingerprint>>;

    /// Current content hash of one source.
    fn hash_source(&self, source: &SourceFile) -> Result<ContentHash>;

    /// Current content hash of every binary input.
    fn binary_hashes(&self, inputs: &ProjectInputs) -> Result<BTreeMap<BinaryFile, ContentHash>>;
}

/// Content-hash detector rooted at a project directory.
#[derive(Debug, Clone)]
pub struct FsChangeDetector {
    root: PathBuf,
}

impl FsChangeDetector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsChangeDetector { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Hash each path in parallel. Unreadable files map to `None`.
    fn hash_all<'a, T>(
        &self,
        items: impl IntoParallelIterator<Item = &'a T>,
    ) -> Vec<(&'a T, Option<ContentHash>)>
    where
        T: AsRef<Path> + Sync + 'a,
    {
        items
            .into_par_iter()
            .map(|item| {
                let hash = match ContentHash::of_file(&self.resolve(item.as_ref())) {
                    Ok(hash) => Some(hash),
                    Err(e) => {
                        warn!(
                            path = %item.as_ref().display(),
                            "cannot read input, treating it as changed: {:#}", e
                        );
                        None
                    }
                };
                (item, hash)
            })
            .collect()
    }
}

impl ChangeDetector for FsChangeDetector {
    fn changed_sources(
        &self,
        prior: &PriorBuildRecord,
        inputs: &ProjectInputs,
    ) -> Result<ChangeSet<SourceFile>> {
        let mut added = BTreeSet::new();
        let mut modified = BTreeSet::new();
        let mut unmodified = BTreeSet::new();

        for (source, hash) in self.hash_all(&inputs.sources) {
            match (prior.source_hash(source), hash) {
                (None, _) => {
                    added.insert(source.clone());
                }
                (Some(previous), Some(current)) if *previous == current => {
                    unmodified.insert(source.clone());
                }
                (Some(_), _) => {
                    modified.insert(source.clone());
                }
            }
        }

        let removed: BTreeSet<_> = prior
            .known_sources()
            .keys()
            .filter(|s| !inputs.sources.contains(*s))
            .cloned()
            .collect();

        debug!(
            added = added.len(),
            removed = removed.len(),
            modified = modified.len(),
            unmodified = unmodified.len(),
            "detected source changes"
        );
        Ok(ChangeSet::new(added, removed, modified, unmodified)?)
    }

    fn changed_binaries(
        &self,
        prior: &PriorBuildRecord,
        inputs: &ProjectInputs,
    ) -> Result<BTreeSet<BinaryFile>> {
        let known = prior.known_binaries();
        let mut changed: BTreeSet<BinaryFile> = self
            .hash_all(&inputs.binaries)
            .into_iter()
            .filter(|(binary, hash)| match (known.get(*binary), hash) {
                (Some(previous), Some(current)) => previous != current,
                _ => true,
            })
            .map(|(binary, _)| binary.clone())
            .collect();

        changed.extend(
            known
                .keys()
                .filter(|b| !inputs.binaries.contains(*b))
                .cloned(),
        );
        Ok(changed)
    }

    fn removed_products(
        &self,
        prior: &PriorBuildRecord,
        removed_sources: &BTreeSet<SourceFile>,
    ) -> Result<BTreeSet<ProductFile>> {
        let mut removed: BTreeSet<ProductFile> = prior
            .known_products()
            .into_iter()
            .filter(|p| !self.resolve(p.path()).exists())
            .collect();

        for source in removed_sources {
            if let Some(products) = prior.products_of(source) {
                removed.extend(products.iter().cloned());
            }
        }
        Ok(removed)
    }

    fn classpath_fingerprints(&self, entries: &[PathBuf]) -> Result<Vec<FileFingerprint>> {
        entries
            .par_iter()
            .map(|entry| -> Result<FileFingerprint> {
                let hash = ContentHash::of_path(&self.resolve(entry)).with_context(|| {
                    format!("failed to fingerprint classpath entry: {}", entry.display())
                })?;
                Ok(FileFingerprint::new(entry.clone(), hash))
            })
            .collect()
    }

    fn hash_source(&self, source: &SourceFile) -> Result<ContentHash> {
        ContentHash::of_file(&self.resolve(source.path()))
    }

    fn binary_hashes(&self, inputs: &ProjectInputs) -> Result<BTreeMap<BinaryFile, ContentHash>> {
        inputs
            .binaries
            .par_iter()
            .map(|binary| -> Result<(BinaryFile, ContentHash)> {
                let hash = ContentHash::of_file(&self.resolve(binary.path()))?;
                Ok((binary.clone(), hash))
            })
            .collect()
    }
}
