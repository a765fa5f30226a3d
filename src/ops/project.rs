//! Project-level operations behind the `drydock` commands.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::change_set::ChangeSet;
use crate::core::files::{BinaryFile, ProductFile, SourceFile};
use crate::core::record::PriorBuildRecord;
use crate::hooks::ExternalHooks;
use crate::lookup::{ChangeDetector, FsChangeDetector, ProjectInputs};
use crate::ops::round::{Invalidation, Round};
use crate::util::config::{
    global_config_path, load_config, project_config_path, record_path, state_dir,
    ClassFileManagerType, Config, IncrementalOptions,
};
use crate::util::fs::{remove_dir_all_if_exists, remove_file_if_exists};

/// A project directory with its merged configuration.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: Config,
    options: IncrementalOptions,
}

impl Project {
    /// Load the project at `root`, merging global and project config.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let global = global_config_path().unwrap_or_default();
        let config = load_config(&global, &project_config_path(&root))?;
        Self::with_config(root, config)
    }

    /// A project with an explicit configuration.
    pub fn with_config(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let options = config
            .incremental_options()
            .context("invalid [incremental] configuration")?;
        Ok(Project {
            root: root.into(),
            config,
            options,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn options(&self) -> &IncrementalOptions {
        &self.options
    }

    pub fn state_dir(&self) -> PathBuf {
        state_dir(&self.root)
    }

    pub fn record_path(&self) -> PathBuf {
        record_path(&self.root)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.sources.output_dir)
    }

    /// The project's current sources, binaries, and classpath.
    pub fn inputs(&self) -> Result<ProjectInputs> {
        ProjectInputs::discover(&self.root, &self.config.sources)
    }

    /// The saved record, or the empty record if none was saved.
    pub fn load_record(&self) -> Result<PriorBuildRecord> {
        PriorBuildRecord::load(&self.record_path())
    }

    /// A round configured for this project.
    pub fn round(&self) -> Round {
        Round::new(&self.root, self.options.clone()).with_state_dir(self.state_dir())
    }
}

/// What `drydock status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub has_record: bool,
    pub mode: String,
    pub sources: ChangeSet<SourceFile>,
    pub changed_binaries: BTreeSet<BinaryFile>,
    pub removed_products: BTreeSet<ProductFile>,
    pub to_compile: BTreeSet<SourceFile>,
    pub classpath_changed: bool,
    pub up_to_date: bool,
}

/// Plan a round without compiling and report what it would do.
pub fn status(project: &Project, hooks: &ExternalHooks) -> Result<StatusReport> {
    let prior = project.load_record()?;
    let inputs = project.inputs()?;
    let lookup = hooks.effective_lookup();

    let plan = project
        .round()
        .plan(lookup.as_ref(), &prior, &inputs, Invalidation::direct)?;

    Ok(StatusReport {
        has_record: !prior.is_empty(),
        mode: plan.mode.to_string(),
        up_to_date: plan.is_up_to_date(),
        sources: plan.changes.sources,
        changed_binaries: plan.changes.binaries,
        removed_products: plan.changes.removed_products,
        to_compile: plan.to_compile,
        classpath_changed: plan.classpath_changed,
    })
}

/// Render a status report for the terminal.
pub fn format_status(report: &StatusReport) -> String {
    let mut out = String::new();

    if !report.has_record {
        let _ = writeln!(out, "No build record; the next build is a full build.");
    }
    if report.up_to_date {
        let _ = writeln!(out, "Up to date.");
        return out;
    }

    let sections: [(&str, &BTreeSet<SourceFile>); 3] = [
        ("added", report.sources.added()),
        ("modified", report.sources.modified()),
        ("removed", report.sources.removed()),
    ];
    for (label, items) in sections {
        for item in items {
            let _ = writeln!(out, "{:>12} {}", label, item);
        }
    }
    for binary in &report.changed_binaries {
        let _ = writeln!(out, "{:>12} {}", "binary", binary);
    }
    for product in &report.removed_products {
        let _ = writeln!(out, "{:>12} {}", "missing", product);
    }
    if report.classpath_changed {
        let _ = writeln!(out, "{:>12} classpath", "changed");
    }

    let _ = writeln!(
        out,
        "\n{} source(s) to compile, {} build",
        report.to_compile.len(),
        report.mode
    );
    out
}

/// Record the current inputs as a clean baseline.
///
/// Products and class names already recorded for a surviving source are
/// kept; everything else is re-hashed from disk.
pub fn record_baseline(project: &Project) -> Result<PriorBuildRecord> {
    let existing = project.load_record()?;
    let inputs = project.inputs()?;
    let detector = FsChangeDetector::new(project.root());

    let mut builder = PriorBuildRecord::builder();
    for source in &inputs.sources {
        let hash = detector
            .hash_source(source)
            .with_context(|| format!("failed to record source: {}", source))?;
        builder = builder.source(source.clone(), hash);
        if let Some(products) = existing.products_of(source) {
            builder = builder.products(source.clone(), products.clone());
        }
        if let Some(classes) = existing.classes_of(source) {
            builder = builder.classes(source.clone(), classes.clone());
        }
    }

    let record = builder
        .binaries(detector.binary_hashes(&inputs)?)
        .classpath(detector.classpath_fingerprints(&inputs.classpath)?)
        .build();
    record.save(&project.record_path())?;
    Ok(record)
}

/// Remove the saved record and any leftover backups. Returns what was
/// removed. Configuration files are kept.
pub fn clean(project: &Project) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();

    let record = project.record_path();
    if remove_file_if_exists(&record)
        .with_context(|| format!("failed to remove {}", record.display()))?
    {
        removed.push(record);
    }

    let mut backup_dirs = vec![project.state_dir().join("backup")];
    if let ClassFileManagerType::Transactional {
        backup_dir: Some(dir),
    } = &project.options().classfile_manager
    {
        backup_dirs.push(project.root().join(dir));
    }
    for dir in backup_dirs {
        if dir.exists() {
            remove_dir_all_if_exists(&dir)?;
            removed.push(dir);
        }
    }

    Ok(removed)
}
