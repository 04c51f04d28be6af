//! Command line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "memkey")]
#[command(about = "Recover a database key from process memory")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Search process memory for a key and confirm it against a digest
    Extract {
        #[command(flatten)]
        target: Target,

        /// Give up after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// JSON pattern file (defaults to the builtin patterns)
        #[arg(short, long)]
        patterns: Option<PathBuf>,

        /// TOML config file
        #[arg(short, long, env = "MEMKEY_CONFIG")]
        config: Option<PathBuf>,

        /// SHA-256 of the expected key, as 64 hex characters
        #[arg(long)]
        key_digest: String,
    },

    /// List candidate keys next to signature matches without validating them
    Candidates {
        #[command(flatten)]
        target: Target,

        /// JSON pattern file (defaults to the builtin patterns)
        #[arg(short, long)]
        patterns: Option<PathBuf>,

        /// Maximum number of candidates to print
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print the builtin patterns or write them to a JSON file
    Patterns {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Where the memory comes from: a live process or a raw dump file.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct Target {
    /// Process ID to read
    #[arg(long)]
    pub pid: Option<u32>,

    /// Raw memory dump file
    #[arg(long)]
    pub dump: Option<PathBuf>,
}
