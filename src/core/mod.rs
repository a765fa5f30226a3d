//! Core data structures for drydock.
//!
//! This module contains the values a round reasons about:
//! - Typed paths for sources, binaries, and generated products
//! - Change sets over those paths
//! - Classpath fingerprints
//! - The record of the prior successful build

pub mod change_set;
pub mod files;
pub mod fingerprint;
pub mod record;

pub use change_set::{Category, ChangeSet, ChangeSetError};
pub use files::{BinaryFile, ProductFile, SourceFile};
pub use fingerprint::FileFingerprint;
pub use record::{PriorBuildRecord, RecordBuilder};
