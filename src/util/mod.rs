//! Shared utilities

pub mod config;
pub mod diagnostic;
pub mod fs;
pub mod hash;

pub use config::{Config, IncrementalOptions};
pub use diagnostic::Diagnostic;
pub use hash::ContentHash;
