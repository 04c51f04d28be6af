use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let directive = if cli.verbose {
        "memkey=debug"
    } else {
        "memkey=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Extract {
            target,
            timeout,
            patterns,
            config,
            key_digest,
        } => commands::extract::run(
            &target,
            timeout,
            patterns.as_deref(),
            config.as_deref(),
            &key_digest,
        ),
        Command::Candidates {
            target,
            patterns,
            limit,
        } => commands::candidates::run(&target, patterns.as_deref(), limit),
        Command::Patterns { output } => commands::patterns::run(output.as_deref()),
    }
}
