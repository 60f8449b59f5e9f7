//! Conversion of CLI errors into miette reports.

use kiln_core::OptimizeError;
use miette::Report;

use crate::error::{BuildError, CliError};

pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Build(e) => build_error_to_miette(e),
        CliError::Config(e) => miette::miette!("Configuration error: {}", e),
        _ => miette::miette!("{}", err),
    }
}

pub fn build_error_to_miette(err: BuildError) -> Report {
    match err {
        BuildError::PreBundle {
            source:
                OptimizeError::Parse {
                    file,
                    line,
                    column,
                    message,
                    frame,
                },
            ..
        } => miette::miette!(
            "Dependency pre-bundling failed\n\n  {}:{}:{}\n  {}\n\n{}",
            file,
            line,
            column,
            message,
            frame
        ),
        BuildError::PreBundle {
            source: OptimizeError::NodeBuiltin {
                package,
                builtin,
                importer,
            },
            hint,
        } => miette::miette!(
            "Dependency \"{}\" imports the Node built-in \"{}\"\nImported from: {}\n\nHint: {}",
            package,
            builtin,
            importer,
            hint.unwrap_or_default()
        ),
        _ => miette::miette!("{}", err),
    }
}
