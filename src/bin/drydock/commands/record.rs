//! `drydock record` command

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::RecordArgs;
use crate::commands::load_project;
use drydock::ops::record_baseline;

pub fn execute(project_dir: Option<PathBuf>, args: RecordArgs) -> Result<()> {
    let project = load_project(project_dir)?;

    if args.dry_run {
        let inputs = project.inputs()?;
        for source in &inputs.sources {
            println!("{}", source);
        }
        eprintln!("   Would record {} source(s)", inputs.sources.len());
        return Ok(());
    }

    let record = record_baseline(&project)?;
    eprintln!(
        "    Recorded {} source(s), {} binary(ies) in {}",
        record.known_sources().len(),
        record.known_binaries().len(),
        project.record_path().display()
    );

    Ok(())
}
