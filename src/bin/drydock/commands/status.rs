//! `drydock status` command

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::cli::StatusArgs;
use crate::commands::load_project;
use drydock::ops::{format_status, status};
use drydock::util::diagnostic::{emit, suggestions, Diagnostic};
use drydock::ExternalHooks;

pub fn execute(project_dir: Option<PathBuf>, args: StatusArgs, color: bool) -> Result<()> {
    let project = load_project(project_dir)?;
    let report = status(&project, &ExternalHooks::new())?;

    if report.sources.current().is_empty() {
        let patterns = project.config().sources.include.join(", ");
        emit(
            &Diagnostic::warning("no sources found")
                .with_location(project.root())
                .with_context(format!("patterns: {}", patterns))
                .with_suggestion(suggestions::NO_SOURCES),
            color,
        );
    }

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize status")?;
        println!("{}", json);
    } else {
        print!("{}", format_status(&report));
    }

    Ok(())
}
