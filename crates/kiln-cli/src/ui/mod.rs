//! Terminal status output.
//!
//! Status lines go to stderr so piped stdout stays clean. Colors follow
//! `--no-color`, `NO_COLOR`, `FORCE_COLOR` and whether stderr is a terminal.
//!
//! ```no_run
//! use kiln_cli::ui;
//!
//! ui::init_colors(false);
//! let spinner = ui::Spinner::new("Pre-bundling dependencies...");
//! spinner.finish("Pre-bundled 3 dependencies");
//! ui::success("Server ready");
//! ```

mod format;
mod messages;
mod spinner;

use std::sync::atomic::{AtomicBool, Ordering};

pub use format::{format_duration, print_dep_summary};
pub use messages::{debug, error, info, success, warning};
pub use spinner::Spinner;

static COLORS: AtomicBool = AtomicBool::new(true);

/// Whether we are running under a CI service.
pub fn is_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "CIRCLECI", "TRAVIS"]
        .iter()
        .any(|var| std::env::var_os(var).is_some())
}

/// `NO_COLOR` disables, `FORCE_COLOR` forces, otherwise stderr must be a
/// terminal.
pub fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    console::user_attended_stderr()
}

/// Decide once whether status lines are colored. Call early in `main`.
pub fn init_colors(no_color: bool) {
    let enabled = !no_color && should_use_color();
    COLORS.store(enabled, Ordering::Relaxed);
    console::set_colors_enabled_stderr(enabled);
}

pub(crate) fn colors_enabled() -> bool {
    COLORS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn no_color_overrides_force_color() {
        // SAFETY: serialized with every other test touching the environment.
        unsafe {
            std::env::set_var("NO_COLOR", "1");
            std::env::set_var("FORCE_COLOR", "1");
        }
        assert!(!should_use_color());
        unsafe { std::env::remove_var("NO_COLOR") };
        assert!(should_use_color());
        unsafe { std::env::remove_var("FORCE_COLOR") };
    }

    #[test]
    #[serial]
    fn ci_is_detected() {
        unsafe { std::env::set_var("GITLAB_CI", "true") };
        assert!(is_ci());
        unsafe { std::env::remove_var("GITLAB_CI") };
    }

    #[test]
    #[serial]
    fn flag_disables_colors() {
        unsafe { std::env::set_var("FORCE_COLOR", "1") };
        init_colors(true);
        assert!(!colors_enabled());
        init_colors(false);
        assert!(colors_enabled());
        unsafe { std::env::remove_var("FORCE_COLOR") };
    }
}
