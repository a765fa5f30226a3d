//! `drydock hash` command

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::HashArgs;
use crate::commands::load_project;
use drydock::lookup::{ChangeDetector, FsChangeDetector};

pub fn execute(project_dir: Option<PathBuf>, args: HashArgs) -> Result<()> {
    let project = load_project(project_dir)?;
    let detector = FsChangeDetector::new(project.root());

    for print in detector.classpath_fingerprints(&args.entries)? {
        println!("{}  {}", print.content_hash, print.path.display());
    }

    Ok(())
}
