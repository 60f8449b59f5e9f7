//! `kiln dev`: serve the project with hot updates.
//!
//! Startup runs the dependency optimizer (when enabled), then starts the
//! file watcher and the HTTP server. The main loop feeds debounced file
//! changes into the dev state until Ctrl+C, a server exit or a fatal
//! pipeline error.

use std::sync::Arc;
use std::time::Duration;

use kiln_core::OptimizeOutcome;
use tokio::signal;
use tokio::sync::oneshot;

use crate::cli::DevArgs;
use crate::config::{LoadedConfig, Overrides};
use crate::dev::{DEFAULT_IGNORES, DevServer, DevState, FileWatcher, collect_burst};
use crate::error::{BuildError, CliError, Result};
use crate::ui;

use super::utils::{build_resolver, run_optimizer};

pub async fn execute(args: DevArgs) -> Result<()> {
    let loaded = LoadedConfig::load(args.cwd.as_deref(), Overrides::from(&args))?;
    let config = &loaded.config;
    ui::info(&format!("Project root: {}", loaded.root.display()));

    let resolver = build_resolver(&loaded);

    // A failed pre-bundle leaves the server usable; dependencies are then
    // served straight from node_modules.
    if config.optimize_deps.auto || args.force {
        match run_optimizer(&loaded, &resolver, args.force).await {
            Ok(OptimizeOutcome::Bundled(_)) => resolver.clear_caches(),
            Ok(_) => {}
            Err(err) => {
                ui::error(&err.to_string());
                if let Some(tip) = err.tip() {
                    ui::warning(tip);
                }
                ui::warning("Continuing without pre-bundled dependencies");
            }
        }
    }

    let env = config.env_snapshot(std::env::vars());
    let state = Arc::new(DevState::new(Arc::clone(&resolver), config.mode.clone(), env));

    let ignores = DEFAULT_IGNORES.iter().map(|p| p.to_string()).collect();
    let (watcher, mut change_rx) = FileWatcher::new(loaded.root.clone(), ignores)?;
    state.content.set_watch_registrar(watcher.registrar());
    ui::info(&format!("Watching for changes in: {}", watcher.root().display()));

    let server = DevServer::new(
        config.server.host.clone(),
        config.server.port,
        config.server.cors,
        Arc::clone(&state),
    );
    let url = server.url();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server_handle = tokio::spawn(server.start(async move {
        let _ = shutdown_rx.await;
    }));

    if config.server.open && !ui::is_ci() {
        open_browser(&url);
    }

    ui::info("Press Ctrl+C to stop");

    let debounce = Duration::from_millis(config.server.debounce_ms);
    let mut server_running = true;
    let outcome: Result<()> = loop {
        tokio::select! {
            Some(first) = change_rx.recv() => {
                for change in collect_burst(first, &mut change_rx, debounce).await {
                    tracing::debug!(path = %change.path().display(), "file changed");
                    state.handle_file_change(&change);
                }
            }

            _ = signal::ctrl_c() => {
                ui::info("Shutting down development server...");
                break Ok(());
            }

            joined = &mut server_handle => {
                server_running = false;
                break match joined {
                    Ok(Ok(())) => {
                        ui::warning("Server task completed unexpectedly");
                        Ok(())
                    }
                    Ok(Err(err)) => Err(err),
                    Err(err) => Err(CliError::Server(err.to_string())),
                };
            }

            message = state.fatal_error() => {
                break Err(BuildError::GraphInconsistency(message).into());
            }
        }
    };

    let _ = shutdown_tx.send(());
    if server_running {
        let _ = server_handle.await;
    }
    drop(watcher);

    if outcome.is_ok() {
        ui::success("Development server stopped");
    }
    outcome
}

/// Open `url` in the default browser.
fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => ui::info(&format!("Opened browser at {url}")),
        Err(e) => ui::warning(&format!("Failed to open browser: {e}")),
    }
}
