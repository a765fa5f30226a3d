//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// drydock - invalidation and artifact lifecycle core for incremental compilers
#[derive(Parser)]
#[command(name = "drydock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Project root (defaults to the current directory)
    #[arg(short = 'C', long, global = true, env = "DRYDOCK_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show what changed since the last recorded build
    Status(StatusArgs),

    /// Print content fingerprints for classpath entries
    Hash(HashArgs),

    /// Record the current sources as a clean baseline
    Record(RecordArgs),

    /// Remove the build record and leftover backups
    Clean(CleanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct StatusArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct HashArgs {
    /// Files or class directories, in classpath order
    #[arg(required = true)]
    pub entries: Vec<PathBuf>,
}

#[derive(Args)]
pub struct RecordArgs {
    /// Only print what would be recorded
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct CleanArgs {}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
