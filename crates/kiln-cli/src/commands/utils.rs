//! Pieces shared by the commands.

use std::sync::Arc;
use std::time::Instant;

use kiln_core::{
    OptimizeError, OptimizeOptions, OptimizeOutcome, Resolver, ResolverOptions, RolldownBundler,
    optimize_deps,
};

use crate::config::LoadedConfig;
use crate::ui::{self, Spinner};

/// Resolver configured from the loaded project.
pub fn build_resolver(loaded: &LoadedConfig) -> Arc<Resolver> {
    let mut options = ResolverOptions::new(&loaded.root).public_dir(loaded.public_dir());
    for (key, target) in loaded.config.alias_entries() {
        options = options.alias(key, target);
    }
    Arc::new(Resolver::new(options))
}

pub fn optimize_options(loaded: &LoadedConfig, force: bool) -> OptimizeOptions {
    let deps = &loaded.config.optimize_deps;
    OptimizeOptions {
        root: loaded.root.clone(),
        include: deps.include.clone(),
        exclude: deps.exclude.clone(),
        link: deps.link.clone(),
        allow_node_builtins: deps.allow_node_builtins.clone(),
        config_path: loaded.path.clone(),
        force,
    }
}

/// Run the optimizer behind a spinner and report what it did.
pub async fn run_optimizer(
    loaded: &LoadedConfig,
    resolver: &Resolver,
    force: bool,
) -> Result<OptimizeOutcome, OptimizeError> {
    let options = optimize_options(loaded, force);
    let spinner = Spinner::new("Pre-bundling dependencies...");
    let started = Instant::now();

    let outcome = match optimize_deps(&options, resolver, &RolldownBundler).await {
        Ok(outcome) => outcome,
        Err(err) => {
            spinner.fail("Dependency pre-bundling failed");
            return Err(err);
        }
    };

    match &outcome {
        OptimizeOutcome::NoManifest => {
            spinner.clear();
            ui::debug("No package.json found, skipping dependency pre-bundling");
        }
        OptimizeOutcome::UpToDate => {
            spinner.clear();
            ui::debug("Pre-bundled dependencies are up to date");
        }
        OptimizeOutcome::NothingToBundle => {
            spinner.finish("No dependencies need pre-bundling");
        }
        OptimizeOutcome::Bundled(deps) => {
            spinner.finish("Dependencies pre-bundled");
            ui::print_dep_summary(deps, resolver.cache_dir(), started.elapsed());
        }
    }
    Ok(outcome)
}
