//! `drydock clean` command

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::CleanArgs;
use crate::commands::load_project;
use drydock::ops::clean;

pub fn execute(project_dir: Option<PathBuf>, _args: CleanArgs) -> Result<()> {
    let project = load_project(project_dir)?;

    let removed = clean(&project)?;
    if removed.is_empty() {
        eprintln!("     Nothing to clean");
    }
    for path in removed {
        eprintln!("     Removed {}", path.display());
    }

    Ok(())
}
