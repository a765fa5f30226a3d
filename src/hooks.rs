//! Externally supplied hooks: a lookup and any number of class file managers.
//!
//! [`ExternalHooks`] is an immutable value. Each `with_*` call returns a new
//! registry and leaves the receiver untouched, so a host can hand the same
//! hooks to several builds and derive per-build variants freely.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::lookup::{DefaultLookup, Lookup};
use crate::manager::policy::default_manager;
use crate::manager::{ClassFileManager, ManagerChain};
use crate::util::config::IncrementalOptions;

/// Optional lookup override plus extra managers, in attach order.
#[derive(Clone, Default)]
pub struct ExternalHooks {
    lookup: Option<Arc<dyn Lookup>>,
    managers: Vec<Arc<dyn ClassFileManager>>,
}

impl fmt::Debug for ExternalHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let managers: Vec<&str> = self.managers.iter().map(|m| m.name()).collect();
        f.debug_struct("ExternalHooks")
            .field("lookup", &self.lookup.is_some())
            .field("managers", &managers)
            .finish()
    }
}

impl ExternalHooks {
    /// No lookup, no managers.
    pub fn new() -> Self {
        ExternalHooks::default()
    }

    /// Hooks with `lookup` installed. A lookup attached earlier is replaced.
    pub fn with_external_lookup(&self, lookup: Arc<dyn Lookup>) -> ExternalHooks {
        ExternalHooks {
            lookup: Some(lookup),
            managers: self.managers.clone(),
        }
    }

    /// Hooks with `manager` added after every manager attached so far.
    pub fn with_external_class_file_manager(
        &self,
        manager: Arc<dyn ClassFileManager>,
    ) -> ExternalHooks {
        let mut managers = self.managers.clone();
        managers.push(manager);
        ExternalHooks {
            lookup: self.lookup.clone(),
            managers,
        }
    }

    pub fn external_lookup(&self) -> Option<Arc<dyn Lookup>> {
        self.lookup.clone()
    }

    /// The attached managers as one.
    ///
    /// `None` with nothing attached, the manager itself with one attached,
    /// otherwise a chain over all of them in attach order.
    pub fn external_class_file_manager(&self) -> Option<Arc<dyn ClassFileManager>> {
        match self.managers.as_slice() {
            [] => None,
            [single] => Some(Arc::clone(single)),
            many => Some(Arc::new(ManagerChain::from_members(many.to_vec()))),
        }
    }

    /// The attached managers in attach order.
    pub fn external_class_file_managers(&self) -> &[Arc<dyn ClassFileManager>] {
        &self.managers
    }

    /// The attached lookup, or [`DefaultLookup`].
    pub fn effective_lookup(&self) -> Arc<dyn Lookup> {
        self.lookup
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultLookup))
    }

    /// A chain for one attempt: the attached managers in order, then the
    /// internal manager `options` selects.
    pub fn manager_chain(&self, options: &IncrementalOptions, state_dir: &Path) -> ManagerChain {
        ManagerChain::new(self.managers.iter().cloned(), default_manager(options, state_dir))
    }

    /// Like [`manager_chain`](Self::manager_chain) with a caller-built
    /// internal manager.
    pub fn manager_chain_with(&self, internal: Arc<dyn ClassFileManager>) -> ManagerChain {
        ManagerChain::new(self.managers.iter().cloned(), internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change_set::ChangeSet;
    use crate::core::files::SourceFile;
    use crate::core::record::PriorBuildRecord;
    use crate::error::LookupError;
    use crate::manager::{EventLog, RecordingManager};
    use crate::util::config::ClassFileManagerType;

    struct NamedLookup(&'static str);

    impl Lookup for NamedLookup {
        fn changed_sources(
            &self,
            _prior: &PriorBuildRecord,
        ) -> Result<Option<ChangeSet<SourceFile>>, LookupError> {
            let added = [SourceFile::from(self.0)].into_iter().collect();
            Ok(Some(
                ChangeSet::new(added, Default::default(), Default::default(), Default::default())
                    .unwrap(),
            ))
        }
    }

    fn answer(hooks: &ExternalHooks) -> Vec<SourceFile> {
        hooks
            .effective_lookup()
            .changed_sources(&PriorBuildRecord::empty())
            .unwrap()
            .map(|c| c.added().iter().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_empty_hooks() {
        let hooks = ExternalHooks::new();
        assert!(hooks.external_lookup().is_none());
        assert!(hooks.external_class_file_manager().is_none());
        assert!(hooks.external_class_file_managers().is_empty());
        assert!(answer(&hooks).is_empty());
    }

    #[test]
    fn test_lookup_last_write_wins() {
        let hooks = ExternalHooks::new()
            .with_external_lookup(Arc::new(NamedLookup("L1.scala")))
            .with_external_lookup(Arc::new(NamedLookup("L2.scala")));
        assert_eq!(answer(&hooks), vec![SourceFile::from("L2.scala")]);
    }

    #[test]
    fn test_with_does_not_mutate_receiver() {
        let base = ExternalHooks::new();
        let derived = base
            .with_external_lookup(Arc::new(NamedLookup("A.scala")))
            .with_external_class_file_manager(Arc::new(RecordingManager::new("ide")));

        assert!(base.external_lookup().is_none());
        assert!(base.external_class_file_managers().is_empty());
        assert!(derived.external_lookup().is_some());
        assert_eq!(derived.external_class_file_managers().len(), 1);
    }

    #[test]
    fn test_single_manager_is_returned_as_is() {
        let manager: Arc<dyn ClassFileManager> = Arc::new(RecordingManager::new("ide"));
        let hooks = ExternalHooks::new().with_external_class_file_manager(Arc::clone(&manager));

        let external = hooks.external_class_file_manager().unwrap();
        assert!(Arc::ptr_eq(&external, &manager));
    }

    #[test]
    fn test_aggregate_keeps_attach_order() {
        let log = EventLog::new();
        let hooks = ExternalHooks::new()
            .with_external_class_file_manager(Arc::new(RecordingManager::with_log(
                "m1",
                log.clone(),
            )))
            .with_external_class_file_manager(Arc::new(RecordingManager::with_log(
                "m2",
                log.clone(),
            )));

        let external = hooks.external_class_file_manager().unwrap();
        external.notify_generated(Path::new("A.class")).unwrap();
        assert_eq!(log.order(), vec!["m1", "m2"]);
    }

    #[test]
    fn test_manager_chain_puts_internal_last() {
        let hooks = ExternalHooks::new()
            .with_external_class_file_manager(Arc::new(RecordingManager::new("m1")))
            .with_external_class_file_manager(Arc::new(RecordingManager::new("m2")));

        let options = IncrementalOptions::default()
            .with_classfile_manager(ClassFileManagerType::DeleteImmediately);
        let chain = hooks.manager_chain(&options, Path::new("/proj/.drydock"));
        assert_eq!(chain.member_names(), vec!["m1", "m2", "delete-immediately"]);
    }

    #[test]
    fn test_debug_lists_manager_names() {
        let hooks =
            ExternalHooks::new().with_external_class_file_manager(Arc::new(RecordingManager::new("ide")));
        let debug = format!("{:?}", hooks);
        assert!(debug.contains("lookup: false"));
        assert!(debug.contains("\"ide\""));
    }
}
