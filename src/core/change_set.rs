//! Partition of the tracked files into added, removed, modified, and
//! unmodified relative to the prior build.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// One of the four categories of a [`ChangeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Added,
    Removed,
    Modified,
    Unmodified,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Added => write!(f, "added"),
            Category::Removed => write!(f, "removed"),
            Category::Modified => write!(f, "modified"),
            Category::Unmodified => write!(f, "unmodified"),
        }
    }
}

/// A change set whose categories were not disjoint.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    #[error("`{item}` is listed as both {first} and {second}")]
    Overlap {
        item: String,
        first: Category,
        second: Category,
    },
}

/// The four disjoint categories of tracked items for one round.
///
/// The union of the categories is every item tracked this round: the items
/// present now plus the ones that disappeared since the prior build. Values
/// are derived per round and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet<T: Ord> {
    added: BTreeSet<T>,
    removed: BTreeSet<T>,
    modified: BTreeSet<T>,
    unmodified: BTreeSet<T>,
}

impl<T: Ord> Default for ChangeSet<T> {
    fn default() -> Self {
        ChangeSet {
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            modified: BTreeSet::new(),
            unmodified: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> ChangeSet<T> {
    /// Build a change set, rejecting any item that appears in two categories.
    pub fn new(
        added: BTreeSet<T>,
        removed: BTreeSet<T>,
        modified: BTreeSet<T>,
        unmodified: BTreeSet<T>,
    ) -> Result<Self, ChangeSetError>
    where
        T: fmt::Display,
    {
        let categories = [
            (Category::Added, &added),
            (Category::Removed, &removed),
            (Category::Modified, &modified),
            (Category::Unmodified, &unmodified),
        ];

        for (i, (first, left)) in categories.iter().enumerate() {
            for (second, right) in &categories[i + 1..] {
                if let Some(item) = left.intersection(right).next() {
                    return Err(ChangeSetError::Overlap {
                        item: item.to_string(),
                        first: *first,
                        second: *second,
                    });
                }
            }
        }

        Ok(ChangeSet {
            added,
            removed,
            modified,
            unmodified,
        })
    }

    /// Compare the prior and current state of every tracked item.
    ///
    /// Items only in `current` are added, items only in `prior` are removed,
    /// items in both are modified when their states differ.
    pub fn diff<V: PartialEq>(prior: &BTreeMap<T, V>, current: &BTreeMap<T, V>) -> Self {
        let mut changes = ChangeSet::default();

        for (item, state) in current {
            match prior.get(item) {
                None => {
                    changes.added.insert(item.clone());
                }
                Some(previous) if previous != state => {
                    changes.modified.insert(item.clone());
                }
                Some(_) => {
                    changes.unmodified.insert(item.clone());
                }
            }
        }

        for item in prior.keys() {
            if !current.contains_key(item) {
                changes.removed.insert(item.clone());
            }
        }

        changes
    }

    /// Every tracked item, whatever its category.
    pub fn tracked(&self) -> BTreeSet<T> {
        self.added
            .iter()
            .chain(&self.removed)
            .chain(&self.modified)
            .chain(&self.unmodified)
            .cloned()
            .collect()
    }

    /// Items that exist now and must be compiled: added plus modified.
    pub fn changed(&self) -> BTreeSet<T> {
        self.added.union(&self.modified).cloned().collect()
    }

    /// Items that exist now, whether changed or not.
    pub fn current(&self) -> BTreeSet<T> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.unmodified)
            .cloned()
            .collect()
    }
}

impl<T: Ord> ChangeSet<T> {
    pub fn added(&self) -> &BTreeSet<T> {
        &self.added
    }

    pub fn removed(&self) -> &BTreeSet<T> {
        &self.removed
    }

    pub fn modified(&self) -> &BTreeSet<T> {
        &self.modified
    }

    pub fn unmodified(&self) -> &BTreeSet<T> {
        &self.unmodified
    }

    /// Category of an item, if it is tracked at all.
    pub fn category_of(&self, item: &T) -> Option<Category> {
        if self.added.contains(item) {
            Some(Category::Added)
        } else if self.removed.contains(item) {
            Some(Category::Removed)
        } else if self.modified.contains(item) {
            Some(Category::Modified)
        } else if self.unmodified.contains(item) {
            Some(Category::Unmodified)
        } else {
            None
        }
    }

    /// True when anything was added, removed, or modified.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.modified.is_empty()
    }

    /// Number of tracked items.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len() + self.unmodified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::files::SourceFile;

    fn set(items: &[&str]) -> BTreeSet<SourceFile> {
        items.iter().map(|s| SourceFile::from(*s)).collect()
    }

    fn assert_disjoint(cs: &ChangeSet<SourceFile>) {
        let parts = [cs.added(), cs.removed(), cs.modified(), cs.unmodified()];
        for (i, left) in parts.iter().enumerate() {
            for right in &parts[i + 1..] {
                assert!(left.is_disjoint(right));
            }
        }
        assert_eq!(cs.tracked().len(), cs.len());
    }

    #[test]
    fn test_new_rejects_overlap() {
        let err = ChangeSet::new(set(&["A.scala"]), set(&[]), set(&["A.scala"]), set(&[]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("A.scala"));
        assert!(msg.contains("added"));
        assert!(msg.contains("modified"));
    }

    #[test]
    fn test_new_accepts_disjoint() {
        let cs = ChangeSet::new(
            set(&["C.scala"]),
            set(&["D.scala"]),
            set(&["A.scala"]),
            set(&["B.scala"]),
        )
        .unwrap();
        assert_disjoint(&cs);
        assert_eq!(cs.len(), 4);
        assert!(cs.has_changes());
    }

    #[test]
    fn test_diff_partitions_universe() {
        let prior: BTreeMap<SourceFile, u32> = [("A.scala", 1), ("B.scala", 2), ("D.scala", 4)]
            .into_iter()
            .map(|(p, h)| (SourceFile::from(p), h))
            .collect();
        let current: BTreeMap<SourceFile, u32> = [("A.scala", 10), ("B.scala", 2), ("C.scala", 3)]
            .into_iter()
            .map(|(p, h)| (SourceFile::from(p), h))
            .collect();

        let cs = ChangeSet::diff(&prior, &current);
        assert_eq!(cs.added(), &set(&["C.scala"]));
        assert_eq!(cs.modified(), &set(&["A.scala"]));
        assert_eq!(cs.unmodified(), &set(&["B.scala"]));
        assert_eq!(cs.removed(), &set(&["D.scala"]));
        assert_disjoint(&cs);

        let universe: BTreeSet<_> = prior.keys().chain(current.keys()).cloned().collect();
        assert_eq!(cs.tracked(), universe);
        assert_eq!(cs.changed(), set(&["A.scala", "C.scala"]));
        assert_eq!(cs.current(), current.keys().cloned().collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_diff_without_changes() {
        let state: BTreeMap<SourceFile, u32> =
            [(SourceFile::from("A.scala"), 1)].into_iter().collect();
        let cs = ChangeSet::diff(&state, &state);
        assert!(!cs.has_changes());
        assert_eq!(cs.category_of(&SourceFile::from("A.scala")), Some(Category::Unmodified));
        assert_eq!(cs.category_of(&SourceFile::from("Z.scala")), None);
    }

    #[test]
    fn test_default_is_empty() {
        let cs: ChangeSet<SourceFile> = ChangeSet::default();
        assert!(cs.is_empty());
        assert!(!cs.has_changes());
    }
}
