//! Kiln CLI - unbundled ES module dev server.
//!
//! Parses arguments, initializes logging and dispatches to a command.

use clap::Parser;
use kiln_cli::{cli, commands, error, logger, ui};
use miette::Result;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    let result = match args.command {
        cli::Command::Dev(dev_args) => commands::dev_execute(dev_args).await,
        cli::Command::Optimize(optimize_args) => commands::optimize_execute(optimize_args).await,
    };

    result.map_err(error::cli_error_to_miette)
}
