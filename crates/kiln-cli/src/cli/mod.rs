//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};


/// Kiln - serve ES modules straight from disk with hot updates.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the development server
    Dev(DevArgs),

    /// Pre-bundle dependencies into the module cache and exit
    Optimize(OptimizeArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct DevArgs {
    /// Port to listen on [default: 3000]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind [default: 127.0.0.1]
    #[arg(long)]
    pub host: Option<String>,

    /// Open the browser once the server is listening
    #[arg(long)]
    pub open: bool,

    /// Re-bundle dependencies even when the cache is up to date
    #[arg(long)]
    pub force: bool,

    /// Project directory [default: current directory]
    #[arg(long)]
    pub cwd: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct OptimizeArgs {
    /// Re-bundle even when the cache is up to date
    #[arg(long)]
    pub force: bool,

    /// Project directory [default: current directory]
    #[arg(long)]
    pub cwd: Option<PathBuf>,
}
