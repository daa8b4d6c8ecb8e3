//! CLI argument definitions for helm.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// helm command-line interface
#[derive(Parser, Debug)]
#[command(name = "helm", version, about = "Tool-using assistant turns and allow-listed commands")]
pub struct Cli {
    /// Config file (defaults to the per-user config path)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a command line against the allowlist
    Check(CheckArgs),
    /// Run an allow-listed command and print its output
    Exec(ExecArgs),
    /// Run one assistant turn with the built-in tools
    Chat(ChatArgs),
}

/// Arguments for `helm check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Command line to validate
    pub line: String,
}

/// Arguments for `helm exec`.
#[derive(Parser, Debug)]
pub struct ExecArgs {
    /// Command line to run
    pub line: String,

    /// Working directory (defaults to the current directory)
    #[arg(long)]
    pub cwd: Option<PathBuf>,
}

/// Arguments for `helm chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Model id override
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Maximum tool rounds before the turn is stopped
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Use the non-streaming endpoint
    #[arg(long)]
    pub no_stream: bool,

    /// Working directory for file and command tools
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// User prompt
    pub prompt: String,
}
