//! End-to-end lifecycle tests against the public API.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use drydock::core::{PriorBuildRecord, SourceFile};
use drydock::error::LookupError;
use drydock::lookup::{ChangeDetector, FsChangeDetector, ProjectInputs};
use drydock::manager::{EventLog, RecordingManager, TransactionalManager};
use drydock::ops::round::{
    CompileMode, CompileOutput, FullRebuildReason, Invalidation, RecompilePlan,
};
use drydock::{ClassFileManager, ExternalHooks, IncrementalOptions, Lookup, Round, RoundOutcome};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

fn sources(names: &[&str]) -> BTreeSet<SourceFile> {
    names.iter().map(|n| SourceFile::from(*n)).collect()
}

fn inputs(names: &[&str]) -> ProjectInputs {
    ProjectInputs::new(sources(names), Vec::new(), Vec::new())
}

/// Compiles each planned source to `out/<Name>.class`.
fn compiler(
    root: PathBuf,
) -> impl FnOnce(&RecompilePlan, &dyn ClassFileManager) -> anyhow::Result<CompileOutput> {
    move |plan, manager| {
        let mut output = CompileOutput::succeeded();
        for source in &plan.to_compile {
            let name = source.implied_class_name().unwrap();
            let product = format!("out/{}.class", name);
            let path = root.join(&product);
            manager.notify_generated(&path)?;
            fs::create_dir_all(path.parent().unwrap())?;
            fs::write(&path, format!("bytecode for {}", source))?;
            output = output.with_source(source.clone(), [product.as_str()], [name]);
        }
        Ok(output)
    }
}

// ============================================================================
// Change detection
// ============================================================================

#[test]
fn test_default_detection_classifies_sources() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "A.scala", "object A");
    write(root, "B.scala", "object B");

    let detector = FsChangeDetector::new(root);
    let prior = PriorBuildRecord::builder()
        .source("A.scala".into(), detector.hash_source(&"A.scala".into()).unwrap())
        .source("B.scala".into(), detector.hash_source(&"B.scala".into()).unwrap())
        .build();

    write(root, "A.scala", "object A { val x = 1 }");
    write(root, "C.scala", "object C");

    let changes = detector
        .changed_sources(&prior, &inputs(&["A.scala", "B.scala", "C.scala"]))
        .unwrap();
    assert_eq!(changes.added(), &sources(&["C.scala"]));
    assert_eq!(changes.modified(), &sources(&["A.scala"]));
    assert_eq!(changes.unmodified(), &sources(&["B.scala"]));
    assert!(changes.removed().is_empty());
}

// ============================================================================
// Class file managers
// ============================================================================

#[test]
fn test_transactional_rollback_restores_overwritten_file() {
    let tmp = TempDir::new().unwrap();
    let class_file = write(tmp.path(), "out/A.class", "original bytes");

    let manager = TransactionalManager::new(tmp.path().join("backup"));
    manager.notify_generated(&class_file).unwrap();
    fs::write(&class_file, "half-written bytes").unwrap();

    let completion = manager.complete(false).unwrap();
    assert!(!completion.is_committed());
    assert_eq!(fs::read_to_string(&class_file).unwrap(), "original bytes");
}

#[test]
fn test_external_managers_run_before_internal() {
    let log = EventLog::new();
    let hooks = ExternalHooks::new()
        .with_external_class_file_manager(Arc::new(RecordingManager::with_log("M1", log.clone())))
        .with_external_class_file_manager(Arc::new(RecordingManager::with_log("M2", log.clone())));
    let chain = hooks.manager_chain_with(Arc::new(RecordingManager::with_log(
        "internal",
        log.clone(),
    )));

    chain.notify_generated(Path::new("out/P.class")).unwrap();
    assert_eq!(log.order(), vec!["M1", "M2", "internal"]);

    log.clear();
    chain.complete(true).unwrap();
    assert_eq!(log.order(), vec!["M1", "M2", "internal"]);
}

// ============================================================================
// Rounds
// ============================================================================

struct Veto;

impl Lookup for Veto {
    fn should_run_incremental(
        &self,
        changed_classes: &BTreeSet<String>,
        _prior: &PriorBuildRecord,
    ) -> Result<bool, LookupError> {
        Ok(changed_classes.is_empty())
    }
}

#[test]
fn test_veto_rebuilds_every_source() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    for name in ["A", "B", "C", "D"] {
        write(root, &format!("{}.scala", name), &format!("class {}", name));
    }
    let all = inputs(&["A.scala", "B.scala", "C.scala", "D.scala"]);
    let round = Round::new(root, IncrementalOptions::default());

    let first = round
        .run(
            &ExternalHooks::new(),
            &PriorBuildRecord::empty(),
            &all,
            Invalidation::direct,
            compiler(root.to_path_buf()),
        )
        .unwrap();
    let prior = first.record().cloned().unwrap();

    write(root, "A.scala", "class A { def f = 1 }");

    let hooks = ExternalHooks::new().with_external_lookup(Arc::new(Veto));
    let outcome = round
        .run(&hooks, &prior, &all, Invalidation::direct, compiler(root.to_path_buf()))
        .unwrap();

    match outcome {
        RoundOutcome::Compiled { plan, record, .. } => {
            assert_eq!(
                plan.mode,
                CompileMode::Full {
                    reason: FullRebuildReason::Vetoed
                }
            );
            assert_eq!(plan.to_compile.len(), 4);
            assert_eq!(plan.changed_classes.len(), 1);
            assert_eq!(record.known_sources().len(), 4);
        }
        other => panic!("expected a compiled round, got {:?}", other),
    }
}

#[test]
fn test_failed_round_leaves_outputs_and_record_alone() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "A.scala", "class A");
    write(root, "B.scala", "class B");
    let all = inputs(&["A.scala", "B.scala"]);
    let round = Round::new(root, IncrementalOptions::default());

    let prior = round
        .run(
            &ExternalHooks::new(),
            &PriorBuildRecord::empty(),
            &all,
            Invalidation::direct,
            compiler(root.to_path_buf()),
        )
        .unwrap()
        .record()
        .cloned()
        .unwrap();
    let before = fs::read(root.join("out/A.class")).unwrap();

    write(root, "A.scala", "class A { broken");
    let outcome = round
        .run(&ExternalHooks::new(), &prior, &all, Invalidation::direct, {
            let root = root.to_path_buf();
            move |_plan, manager| {
                let path = root.join("out/A.class");
                manager.notify_generated(&path)?;
                fs::write(&path, "garbage")?;
                Ok(CompileOutput::failed())
            }
        })
        .unwrap();

    assert!(!outcome.is_success());
    assert!(outcome.record().is_none());
    assert_eq!(fs::read(root.join("out/A.class")).unwrap(), before);
    assert!(root.join("out/B.class").exists());
}
