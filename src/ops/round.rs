//! One incremental compilation round.
//!
//! A round reads the hooks once, asks the effective lookup its five
//! questions in a fixed order (falling back to filesystem detection for each
//! question the lookup defers), decides what to recompile, and runs the
//! compile callback inside a single lifecycle attempt. A successful attempt
//! yields the next build record; a failed one leaves the output directory
//! the way the internal manager's policy promises.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::core::change_set::ChangeSet;
use crate::core::files::{BinaryFile, ProductFile, SourceFile};
use crate::core::fingerprint::FileFingerprint;
use crate::core::record::PriorBuildRecord;
use crate::error::{LookupError, LookupOperation, ManagerError, RoundError};
use crate::hooks::ExternalHooks;
use crate::lookup::{ChangeDetector, FsChangeDetector, Lookup, ProjectInputs};
use crate::manager::{ClassFileManager, Completion, ManagerChain, MemberCompletions};
use crate::util::config::{IncrementalOptions, STATE_DIR};
use crate::util::hash::ContentHash;

/// The three change answers, however they were obtained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectedChanges {
    pub sources: ChangeSet<SourceFile>,
    pub binaries: BTreeSet<BinaryFile>,
    pub removed_products: BTreeSet<ProductFile>,
}

/// What the dependency graph decided must be recompiled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invalidation {
    /// Class names whose definitions changed or disappeared
    pub changed_classes: BTreeSet<String>,

    /// Sources to recompile
    pub sources: BTreeSet<SourceFile>,
}

impl Invalidation {
    /// Invalidation without a dependency graph: recompile what changed
    /// directly, plus every source whose products went missing.
    pub fn direct(changes: &DetectedChanges, prior: &PriorBuildRecord) -> Self {
        let current = changes.sources.current();
        let mut sources = changes.sources.changed();
        for product in &changes.removed_products {
            if let Some(owner) = prior.owner_of(product) {
                if current.contains(owner) {
                    sources.insert(owner.clone());
                }
            }
        }

        let mut changed_classes = BTreeSet::new();
        for source in sources.iter().chain(changes.sources.removed()) {
            match prior.classes_of(source) {
                Some(classes) => changed_classes.extend(classes.iter().cloned()),
                None => changed_classes.extend(source.implied_class_name()),
            }
        }

        Invalidation {
            changed_classes,
            sources,
        }
    }
}

/// Why a round recompiles everything.
#[derive(Debug, Clone, PartialEq)]
pub enum FullRebuildReason {
    /// Nothing was built before.
    NoPriorBuild,

    /// The lookup answered `false` to `should_run_incremental`.
    Vetoed,

    /// More sources were invalidated than the configured fraction allows.
    TooManyInvalidated { invalidated: usize, total: usize },
}

impl fmt::Display for FullRebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullRebuildReason::NoPriorBuild => write!(f, "no prior build"),
            FullRebuildReason::Vetoed => write!(f, "incremental compilation vetoed by lookup"),
            FullRebuildReason::TooManyInvalidated { invalidated, total } => {
                write!(f, "{} of {} sources invalidated", invalidated, total)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompileMode {
    Incremental,
    Full { reason: FullRebuildReason },
}

impl CompileMode {
    pub fn is_full(&self) -> bool {
        matches!(self, CompileMode::Full { .. })
    }
}

impl fmt::Display for CompileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileMode::Incremental => write!(f, "incremental"),
            CompileMode::Full { reason } => write!(f, "full ({})", reason),
        }
    }
}

/// Where a change answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsweredBy {
    Lookup,
    Detector,
}

/// Everything a round decided before compiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RecompilePlan {
    pub mode: CompileMode,
    pub changes: DetectedChanges,
    pub changed_classes: BTreeSet<String>,

    /// Sources handed to the front-end
    pub to_compile: BTreeSet<SourceFile>,

    /// Products of recompiled or removed sources, deleted before compiling
    pub stale_products: BTreeSet<ProductFile>,

    pub classpath: Vec<FileFingerprint>,
    pub classpath_changed: bool,

    /// Who answered the source question
    pub sources_answered_by: AnsweredBy,

    /// Who answered the binary question
    pub binaries_answered_by: AnsweredBy,
}

impl RecompilePlan {
    /// True when there is nothing to compile, delete, or re-record.
    pub fn is_up_to_date(&self) -> bool {
        !self.mode.is_full()
            && self.to_compile.is_empty()
            && self.stale_products.is_empty()
            && self.changes.sources.removed().is_empty()
            && self.changes.binaries.is_empty()
            && self.changes.removed_products.is_empty()
            && !self.classpath_changed
    }
}

/// What the front-end produced for one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledSource {
    pub products: BTreeSet<ProductFile>,
    pub classes: BTreeSet<String>,

    /// Hash of the content the front-end actually compiled, when it knows
    pub content_hash: Option<ContentHash>,
}

/// The front-end's report for one attempt.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub success: bool,
    pub sources: BTreeMap<SourceFile, CompiledSource>,
}

impl CompileOutput {
    pub fn succeeded() -> Self {
        CompileOutput {
            success: true,
            sources: BTreeMap::new(),
        }
    }

    pub fn failed() -> Self {
        CompileOutput::default()
    }

    /// Add the products and classes emitted for `source`.
    pub fn with_source<P, C>(
        mut self,
        source: impl Into<SourceFile>,
        products: impl IntoIterator<Item = P>,
        classes: impl IntoIterator<Item = C>,
    ) -> Self
    where
        P: Into<ProductFile>,
        C: Into<String>,
    {
        let entry = self.sources.entry(source.into()).or_default();
        entry.products = products.into_iter().map(Into::into).collect();
        entry.classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Report the hash of the content compiled for `source`.
    ///
    /// Hosts whose sources live in an editor rather than on disk report it
    /// here so the next record never has to read the file.
    pub fn with_content_hash(mut self, source: impl Into<SourceFile>, hash: ContentHash) -> Self {
        self.sources.entry(source.into()).or_default().content_hash = Some(hash);
        self
    }
}

/// How a round ended.
#[derive(Debug)]
pub enum RoundOutcome {
    /// Nothing changed; the prior record still holds.
    UpToDate,

    /// The attempt committed and `record` replaces the prior one.
    ///
    /// `manager_failures` holds what external managers reported while the
    /// internal manager committed; the artifacts are in place regardless.
    Compiled {
        plan: RecompilePlan,
        completion: Completion,
        record: PriorBuildRecord,
        manager_failures: Vec<ManagerError>,
    },

    /// The front-end reported errors and the attempt was rolled back.
    Failed {
        plan: RecompilePlan,
        completion: Completion,
    },
}

impl RoundOutcome {
    /// The record to keep after this round.
    pub fn record(&self) -> Option<&PriorBuildRecord> {
        match self {
            RoundOutcome::Compiled { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, RoundOutcome::Failed { .. })
    }
}

/// Runs rounds for one project.
pub struct Round {
    root: PathBuf,
    state_dir: PathBuf,
    options: IncrementalOptions,
    detector: Arc<dyn ChangeDetector>,
}

impl Round {
    /// A round over `root` using filesystem detection and `root/.drydock`
    /// for its state.
    pub fn new(root: impl Into<PathBuf>, options: IncrementalOptions) -> Self {
        let root = root.into();
        Round {
            state_dir: root.join(STATE_DIR),
            detector: Arc::new(FsChangeDetector::new(root.clone())),
            root,
            options,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn ChangeDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    pub fn options(&self) -> &IncrementalOptions {
        &self.options
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Apply the lookup-failure policy to one answer.
    fn consult<T>(
        &self,
        operation: LookupOperation,
        answer: Result<Option<T>, LookupError>,
    ) -> Result<Option<T>, RoundError> {
        match answer {
            Ok(Some(value)) => {
                debug!(%operation, "lookup answered");
                Ok(Some(value))
            }
            Ok(None) => {
                debug!(%operation, "lookup deferred to detection");
                Ok(None)
            }
            Err(e) if self.options.strict => Err(e.into()),
            Err(e) => {
                warn!(%operation, "lookup failed, falling back to detection: {}", e);
                Ok(None)
            }
        }
    }

    /// Work out what this round must do without touching the output
    /// directory.
    pub fn plan(
        &self,
        lookup: &dyn Lookup,
        prior: &PriorBuildRecord,
        inputs: &ProjectInputs,
        invalidate: impl FnOnce(&DetectedChanges, &PriorBuildRecord) -> Invalidation,
    ) -> Result<RecompilePlan, RoundError> {
        use LookupOperation::*;

        let (sources, sources_answered_by) =
            match self.consult(ChangedSources, lookup.changed_sources(prior))? {
                Some(sources) => (sources, AnsweredBy::Lookup),
                None => (
                    self.detector
                        .changed_sources(prior, inputs)
                        .map_err(|e| RoundError::detection(ChangedSources, e))?,
                    AnsweredBy::Detector,
                ),
            };

        let (binaries, binaries_answered_by) =
            match self.consult(ChangedBinaries, lookup.changed_binaries(prior))? {
                Some(binaries) => (binaries, AnsweredBy::Lookup),
                None => (
                    self.detector
                        .changed_binaries(prior, inputs)
                        .map_err(|e| RoundError::detection(ChangedBinaries, e))?,
                    AnsweredBy::Detector,
                ),
            };

        let removed_products =
            match self.consult(RemovedProducts, lookup.removed_products(prior))? {
                Some(products) => products,
                None => self
                    .detector
                    .removed_products(prior, sources.removed())
                    .map_err(|e| RoundError::detection(RemovedProducts, e))?,
            };

        let changes = DetectedChanges {
            sources,
            binaries,
            removed_products,
        };
        let invalidation = invalidate(&changes, prior);

        let incremental_allowed =
            match lookup.should_run_incremental(&invalidation.changed_classes, prior) {
                Ok(allowed) => allowed,
                Err(e) if self.options.strict => return Err(e.into()),
                Err(e) => {
                    warn!("lookup failed to answer {}: {}", ShouldRunIncremental, e);
                    true
                }
            };

        let expected = inputs.classpath.len();
        let answer = lookup
            .classpath_fingerprints(&inputs.classpath)
            .and_then(|answer| match answer {
                Some(prints) if prints.len() != expected => Err(LookupError::FingerprintCount {
                    expected,
                    actual: prints.len(),
                }),
                other => Ok(other),
            });
        let classpath = match self.consult(ClasspathFingerprints, answer)? {
            Some(prints) => prints,
            None => self
                .detector
                .classpath_fingerprints(&inputs.classpath)
                .map_err(|e| RoundError::detection(ClasspathFingerprints, e))?,
        };
        let classpath_changed = classpath.as_slice() != prior.classpath();

        let current = changes.sources.current();
        let invalidated: BTreeSet<SourceFile> = invalidation
            .sources
            .iter()
            .filter(|s| current.contains(*s))
            .cloned()
            .collect();

        let mode = self.choose_mode(incremental_allowed, prior, invalidated.len(), current.len());

        let (to_compile, stale_products) = if mode.is_full() {
            (current, prior.known_products())
        } else {
            let stale = invalidated
                .iter()
                .chain(changes.sources.removed())
                .filter_map(|s| prior.products_of(s))
                .flatten()
                .filter(|p| !changes.removed_products.contains(*p))
                .cloned()
                .collect();
            (invalidated, stale)
        };

        Ok(RecompilePlan {
            mode,
            changes,
            changed_classes: invalidation.changed_classes,
            to_compile,
            stale_products,
            classpath,
            classpath_changed,
            sources_answered_by,
            binaries_answered_by,
        })
    }

    fn choose_mode(
        &self,
        incremental_allowed: bool,
        prior: &PriorBuildRecord,
        invalidated: usize,
        total: usize,
    ) -> CompileMode {
        let reason = if !incremental_allowed {
            info!("lookup vetoed incremental compilation, recompiling everything");
            FullRebuildReason::Vetoed
        } else if prior.is_empty() && total > 0 {
            FullRebuildReason::NoPriorBuild
        } else if self.options.recompile_all_fraction < 1.0
            && total > 0
            && invalidated as f64 / total as f64 > self.options.recompile_all_fraction
        {
            info!(
                invalidated,
                total,
                fraction = self.options.recompile_all_fraction,
                "too many sources invalidated, recompiling everything"
            );
            FullRebuildReason::TooManyInvalidated { invalidated, total }
        } else {
            return CompileMode::Incremental;
        };
        CompileMode::Full { reason }
    }

    /// Run one round.
    ///
    /// `compile` receives the plan and the attempt's manager; it must call
    /// `notify_generated` before writing each artifact. Returning `Err`
    /// means the front-end itself broke, which rolls the attempt back and
    /// surfaces as [`RoundError::CompilerAborted`]. Ordinary compile errors
    /// are reported through [`CompileOutput::success`].
    pub fn run(
        &self,
        hooks: &ExternalHooks,
        prior: &PriorBuildRecord,
        inputs: &ProjectInputs,
        invalidate: impl FnOnce(&DetectedChanges, &PriorBuildRecord) -> Invalidation,
        compile: impl FnOnce(&RecompilePlan, &dyn ClassFileManager) -> anyhow::Result<CompileOutput>,
    ) -> Result<RoundOutcome, RoundError> {
        let lookup = hooks.effective_lookup();
        let chain = hooks.manager_chain(&self.options, &self.state_dir);

        let plan = self.plan(lookup.as_ref(), prior, inputs, invalidate)?;
        if plan.is_up_to_date() {
            info!("up to date");
            return Ok(RoundOutcome::UpToDate);
        }

        info!(
            mode = %plan.mode,
            sources = plan.to_compile.len(),
            stale = plan.stale_products.len(),
            "compiling"
        );

        for product in &plan.stale_products {
            if let Err(e) = chain.notify_deleted(&self.resolve(product.path())) {
                return Err(abandon(&chain, e.into()));
            }
        }

        let manager: &dyn ClassFileManager = &chain;
        let output = match compile(&plan, manager) {
            Ok(output) => output,
            Err(e) => {
                let cause = RoundError::CompilerAborted {
                    message: format!("{:#}", e),
                };
                return Err(abandon(&chain, cause));
            }
        };

        if !output.success {
            let completion = chain.complete(false)?;
            info!("compilation failed, output directory rolled back");
            return Ok(RoundOutcome::Failed { plan, completion });
        }

        // The record must exist before anything is committed: artifacts
        // nobody records would never be cleaned up.
        let record = match self.next_record(prior, inputs, &plan, &output) {
            Ok(record) => record,
            Err(e) => return Err(abandon(&chain, e)),
        };

        let MemberCompletions {
            last,
            earlier_failures,
        } = chain.complete_members(true)?;
        let completion = last?;
        for failure in &earlier_failures {
            warn!("external manager failed while committing: {}", failure);
        }

        Ok(RoundOutcome::Compiled {
            plan,
            completion,
            record,
            manager_failures: earlier_failures,
        })
    }

    /// Fold a successful attempt into the record that replaces `prior`.
    ///
    /// Only reads the filesystem for answers the detector gave. Sources the
    /// lookup reported take the hash the front-end reported, then the prior
    /// hash when unmodified, and otherwise [`ContentHash::unknown`].
    fn next_record(
        &self,
        prior: &PriorBuildRecord,
        inputs: &ProjectInputs,
        plan: &RecompilePlan,
        output: &CompileOutput,
    ) -> Result<PriorBuildRecord, RoundError> {
        let mut builder = if plan.mode.is_full() {
            PriorBuildRecord::builder()
        } else {
            prior.to_builder()
        };

        for source in plan.changes.sources.removed() {
            builder = builder.remove_source(source);
        }
        for product in &plan.changes.removed_products {
            builder = builder.remove_product(product);
        }

        let current = plan.changes.sources.current();
        let extra = output
            .sources
            .keys()
            .filter(|s| current.contains(*s) && !plan.to_compile.contains(*s));
        for source in plan.to_compile.iter().chain(extra) {
            let compiled = output.sources.get(source).cloned().unwrap_or_default();
            let hash = match compiled.content_hash {
                Some(hash) => hash,
                None => self.source_hash(prior, plan, source)?,
            };
            builder = builder
                .source(source.clone(), hash)
                .products(source.clone(), compiled.products)
                .classes(source.clone(), compiled.classes);
        }

        let binaries = match plan.binaries_answered_by {
            AnsweredBy::Detector => self
                .detector
                .binary_hashes(inputs)
                .map_err(|e| RoundError::detection(LookupOperation::ChangedBinaries, e))?,
            AnsweredBy::Lookup => inputs
                .binaries
                .iter()
                .map(|binary| {
                    let hash = match prior.known_binaries().get(binary) {
                        Some(hash) if !plan.changes.binaries.contains(binary) => hash.clone(),
                        _ => ContentHash::unknown(),
                    };
                    (binary.clone(), hash)
                })
                .collect(),
        };

        Ok(builder
            .binaries(binaries)
            .classpath(plan.classpath.clone())
            .build())
    }

    fn source_hash(
        &self,
        prior: &PriorBuildRecord,
        plan: &RecompilePlan,
        source: &SourceFile,
    ) -> Result<ContentHash, RoundError> {
        match plan.sources_answered_by {
            AnsweredBy::Detector => self
                .detector
                .hash_source(source)
                .map_err(|e| RoundError::detection(LookupOperation::ChangedSources, e)),
            AnsweredBy::Lookup => {
                let unmodified = plan.changes.sources.unmodified().contains(source);
                Ok(match prior.source_hash(source) {
                    Some(hash) if unmodified => hash.clone(),
                    _ => ContentHash::unknown(),
                })
            }
        }
    }
}

/// Roll back after `cause`. A rollback that leaves the output directory
/// untrusted replaces `cause` as the error to report.
fn abandon(chain: &ManagerChain, cause: RoundError) -> RoundError {
    match chain.complete(false) {
        Ok(_) => cause,
        Err(e) if e.is_fatal() => {
            error!("rollback after `{}` failed: {}", cause, e);
            RoundError::Manager(e)
        }
        Err(e) => {
            warn!("rollback after `{}` reported: {}", cause, e);
            cause
        }
    }
}
