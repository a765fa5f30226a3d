//! Command implementations

pub mod clean;
pub mod completions;
pub mod hash;
pub mod record;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use drydock::ops::Project;

/// Load the project at `dir`, or at the current directory.
pub fn load_project(dir: Option<PathBuf>) -> Result<Project> {
    let root = match dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to get current directory")?,
    };
    Project::load(root)
}
