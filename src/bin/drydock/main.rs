//! drydock CLI - inspect and maintain incremental build state

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("drydock=debug")
    } else {
        EnvFilter::new("drydock=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let project_dir = cli.project_dir;
    let color = !cli.no_color && std::io::stderr().is_terminal();
    match cli.command {
        Commands::Status(args) => commands::status::execute(project_dir, args, color),
        Commands::Hash(args) => commands::hash::execute(project_dir, args),
        Commands::Record(args) => commands::record::execute(project_dir, args),
        Commands::Clean(args) => commands::clean::execute(project_dir, args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
