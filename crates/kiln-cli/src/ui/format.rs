//! Human-readable formatting.

use std::path::Path;
use std::time::Duration;

use console::Term;
use owo_colors::OwoColorize;

use super::colors_enabled;

/// `850ms`, `1.25s`, `2m 5s`.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms < 1000 {
        format!("{total_ms}ms")
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// List the pre-bundled dependencies and where they were written.
pub fn print_dep_summary(deps: &[String], cache_dir: Option<&Path>, elapsed: Duration) {
    let width = usize::from(Term::stderr().size().1).min(80);
    let rule = "─".repeat(width);
    let colors = colors_enabled();

    if colors {
        eprintln!("\n{}", "Pre-bundled dependencies".bold().underline());
    } else {
        eprintln!("\nPre-bundled dependencies");
    }
    eprintln!("{rule}");
    for dep in deps {
        if colors {
            eprintln!("  {} {}", "▸".blue(), dep.bright_white().bold());
        } else {
            eprintln!("  ▸ {dep}");
        }
    }
    eprintln!("{rule}");

    let location = cache_dir
        .map(|dir| format!(" into {}", dir.display()))
        .unwrap_or_default();
    let total = format!(
        "{} {}{location} in {}",
        deps.len(),
        if deps.len() == 1 { "package" } else { "packages" },
        format_duration(elapsed)
    );
    if colors {
        eprintln!("  {}\n", total.dimmed());
    } else {
        eprintln!("  {total}\n");
    }
}
