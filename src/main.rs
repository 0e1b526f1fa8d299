//! adbdeck - Android device console
//!
//! Main entry point for the console application.
//!
//! # Overview
//!
//! Initializes:
//! - Configuration loading ([`ConfigManager`], `config/adbdeck.yaml` plus `ADBDECK_*` overrides)
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime for adb subprocesses and load sessions
//! - Device selection fed by the `adb track-devices` tracker
//! - The package-list [`LoadOrchestrator`] mounted through a [`LoadView`]
//!
//! Commands are read line by line from stdin until `quit` or Ctrl+C.
//!
//! # Commands
//!
//! - `devices`: list connected devices
//! - `select <id>` / `toggle <id>`: change the selected device
//! - `refresh`: reload the package list of the current device, bypassing the cache
//! - `clear`: drop the cached list of the current device
//! - `packages [n]`: print the first `n` packages of the visible list
//! - `status`: loading flag, progress and cache contents
//! - `quit`

use adbdeck::loader::ProgressChannel;
use adbdeck::models::DeviceKey;
use adbdeck::services::{AdbClient, AdbPackageEnumerator, DeviceTracker};
use adbdeck::{
    APP_NAME, ConfigManager, DeckConfig, DeviceSelection, LoadOrchestrator, LoadView, PackageInfo,
    StateChange, VERSION,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Directory holding `adbdeck.yaml`
const CONFIG_DIR: &str = "config";

/// Packages printed by `packages` without an explicit count
const DEFAULT_PACKAGE_PREVIEW: usize = 20;

fn main() -> Result<()> {
    let config_manager = ConfigManager::new(CONFIG_DIR)?;
    let config = config_manager.load_settings()?;

    let _log_guard =
        adbdeck::logging::setup_logging_with_console(&config.log_dir, APP_NAME, config.debug_mode, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Using adb at {}", config.adb_path);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("adbdeck-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let result = runtime.block_on(run(config));

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");

    result
}

async fn run(config: DeckConfig) -> Result<()> {
    let selection = DeviceSelection::new();
    let shutdown = CancellationToken::new();

    let tracker = DeviceTracker::new(AdbClient::from_config(&config), selection.clone(), &config);
    let tracker_task = tokio::spawn(tracker.run(shutdown.child_token()));

    let enumerator =
        AdbPackageEnumerator::from_config(&config).context("Failed to build package enumerator")?;
    let orchestrator: LoadOrchestrator<PackageInfo> = LoadOrchestrator::new(
        Arc::new(enumerator),
        ProgressChannel::new(config.progress_capacity),
        tokio::runtime::Handle::current(),
    );

    let listener = tokio::spawn(report_state_changes(orchestrator.clone()));
    let view = LoadView::mount(orchestrator.clone(), selection.subscribe_key());

    println!("{} v{} - type 'help' for commands", APP_NAME, VERSION);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                tracing::info!("Interrupted");
                break;
            }
        };

        let Some(line) = line else {
            break;
        };
        if !handle_command(line.trim(), &orchestrator, &selection) {
            break;
        }
    }

    tracing::info!("Shutting down");
    if let Some(cancel) = view.teardown() {
        if let Err(e) = cancel.await {
            tracing::debug!("Cancel request task failed: {}", e);
        }
    }

    shutdown.cancel();
    if let Err(e) = tracker_task.await {
        tracing::warn!("Device tracker task failed: {}", e);
    }
    listener.abort();

    orchestrator.metrics().log_summary();
    Ok(())
}

/// Execute one console command. Returns false when the console should exit.
fn handle_command(line: &str, orchestrator: &LoadOrchestrator<PackageInfo>, selection: &DeviceSelection) -> bool {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return true;
    };
    let argument = parts.next();

    match (command, argument) {
        ("quit" | "exit", _) => return false,
        ("help", _) => {
            println!("devices | select <id> | toggle <id> | refresh | clear | packages [n] | status | quit");
        }
        ("devices", _) => {
            let selected = selection.selected();
            let devices = selection.devices();
            if devices.is_empty() {
                println!("No devices connected");
            }
            for device in devices {
                let marker = if selected.as_deref() == Some(device.id.as_str()) { "*" } else { " " };
                println!("{} {}  {}", marker, device.id, device.name);
            }
        }
        ("select", Some(id)) => {
            if let Err(e) = selection.select(id) {
                println!("{}", e);
            }
        }
        ("toggle", Some(id)) => {
            if let Err(e) = selection.toggle(id) {
                println!("{}", e);
            }
        }
        ("refresh", _) => {
            if orchestrator.refresh().is_none() {
                println!("Nothing to refresh");
            }
        }
        ("clear", _) => match selection.active_key() {
            Some(device) => {
                orchestrator.clear_cache(&device);
            }
            None => println!("No device selected"),
        },
        ("packages", count) => {
            let count = count
                .and_then(|c| c.parse().ok())
                .unwrap_or(DEFAULT_PACKAGE_PREVIEW);
            let state = orchestrator.state().snapshot();
            for package in state.results.iter().take(count) {
                println!(
                    "{:<50} {:<16} {}",
                    package.package_name,
                    package.version_name.as_deref().unwrap_or("-"),
                    if package.system { "system" } else { "user" }
                );
            }
            println!("{} of {} packages", count.min(state.result_count()), state.result_count());
        }
        ("status", _) => {
            let state = orchestrator.state().snapshot();
            println!(
                "device: {}  loading: {}  packages: {}",
                state
                    .loaded_device
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "none".to_string()),
                state.is_loading,
                state.result_count()
            );
            if let Some(progress) = state.progress {
                println!("progress: {}/{}", progress.current, progress.total);
            }
            if let Some(error) = state.last_error {
                println!("last error: {}", error);
            }
            println!("cached: {:?}", orchestrator.cached_devices());
        }
        (other, _) => println!("Unknown command '{}', type 'help'", other),
    }

    true
}

fn load_notice(device: &DeviceKey, count: usize) -> String {
    if count == 0 {
        format!("No packages found on {}", device)
    } else {
        format!("Loaded {} packages from {}", count, device)
    }
}

/// Echo visible-state changes to the console.
async fn report_state_changes(orchestrator: LoadOrchestrator<PackageInfo>) {
    let mut rx = orchestrator.state().subscribe();
    loop {
        match rx.recv().await {
            Ok(StateChange::LoadingChanged { is_loading: true }) => println!("Loading packages..."),
            Ok(StateChange::ProgressUpdated {
                progress: Some(progress),
            }) if progress.total > 0 => {
                println!("  {}/{} packages", progress.current, progress.total);
            }
            Ok(StateChange::LoadSucceeded { device, count }) => println!("{}", load_notice(&device, count)),
            Ok(StateChange::ResultsChanged { device: Some(device), count }) => {
                println!("Showing {} packages for {}", count, device);
            }
            Ok(StateChange::LoadFailed { device, message }) => {
                println!("Failed to load packages for {}: {}", device, message);
            }
            Ok(StateChange::StateReset) => println!("No device selected"),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("State listener lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
