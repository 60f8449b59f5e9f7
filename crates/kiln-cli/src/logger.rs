//! Logging setup for the kiln CLI.
//!
//! Library crates only emit `tracing` events; this module installs the one
//! subscriber that prints them.
//!
//! ```rust,no_run
//! use kiln_cli::logger::init_logger;
//!
//! init_logger(false, false, false);
//! tracing::info!("server ready");
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used by `--verbose`.
pub const VERBOSE_FILTER: &str =
    "kiln=debug,kiln_core=debug,kiln_graph=debug,kiln_config=debug,kiln_cli=debug";

/// Filter used by `--quiet`.
pub const QUIET_FILTER: &str = "error";

const DEFAULT_FILTER: &str = "kiln=info,kiln_core=info,kiln_graph=info,kiln_config=info,kiln_cli=info";

/// Install the global subscriber.
///
/// Level selection, first match wins:
/// 1. `verbose`: debug for every kiln crate
/// 2. `quiet`: errors only
/// 3. `RUST_LOG`
/// 4. info for every kiln crate
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(select_filter(verbose, quiet), no_color);
}

/// Install the global subscriber with an explicit filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn select_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_wins_over_quiet() {
        assert_eq!(select_filter(true, true).to_string(), EnvFilter::new(VERBOSE_FILTER).to_string());
        assert_eq!(select_filter(false, true).to_string(), "error");
    }
}
