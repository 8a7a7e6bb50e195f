//! Typist client entry point.
//!
//! Connects to a Typist peripheral over Bluetooth LE and turns console lines
//! into typed text and macro commands.
//!
//! # Usage
//!
//! ```text
//! typist [OPTIONS]
//!
//! Options:
//!   --config <PATH>        Config file [default: platform config dir]
//!   --state-file <PATH>    State file, or "none" to keep state in memory
//!                          [default: state.toml next to the config file]
//!   --device-name <NAME>   Advertised-name prefix to look for
//!   --no-enter             Do not press Enter after typed text
//!   --scan-secs <SECS>     Chooser scan window in seconds
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable              | Description                          |
//! |-----------------------|--------------------------------------|
//! | `TYPIST_CONFIG`       | Config file path                     |
//! | `TYPIST_STATE_FILE`   | State file path, or `none`           |
//! | `TYPIST_DEVICE_NAME`  | Advertised-name prefix               |
//! | `TYPIST_NO_ENTER`     | `true` to suppress Enter             |
//! | `TYPIST_SCAN_SECS`    | Chooser scan window in seconds       |
//! | `RUST_LOG`            | Log filter, overrides `log_level`    |
//!
//! CLI args take precedence over the environment, and both take precedence
//! over the config file.
//!
//! # What happens at startup
//!
//! 1. The config file is loaded (defaults are written on first run).
//! 2. Logging is initialised from `RUST_LOG` or the configured `log_level`.
//! 3. The state file is opened and the error that ended the previous run,
//!    if any, is printed once.
//! 4. The first Bluetooth adapter is opened and the session actor spawned.
//! 5. A silent resume re-attaches to the remembered device, if there is one.
//! 6. Console lines are read until `/quit`, end of input, or Ctrl+C, after
//!    which the link is closed and the device is kept for next time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use typist_client::application::session::SessionController;
use typist_client::application::store::{MemoryStateStore, StateStore};
use typist_client::infrastructure::ble::BtleplugBackend;
use typist_client::infrastructure::console;
use typist_client::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, state_file_for, AppConfig,
};
use typist_client::infrastructure::storage::state::TomlStateStore;

/// Value of `--state-file` that keeps state in memory only.
const EPHEMERAL_STATE: &str = "none";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Typist BLE client.
///
/// Types console lines on the computer the Typist is plugged into, and
/// manages the macros stored on the device.
#[derive(Debug, Parser)]
#[command(name = "typist", about = "Bluetooth LE client for the Typist", version)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, env = "TYPIST_CONFIG")]
    config: Option<PathBuf>,

    /// Path of the state file, or `none` to keep state in memory only.
    #[arg(long, env = "TYPIST_STATE_FILE")]
    state_file: Option<String>,

    /// Advertised-name prefix the chooser looks for.
    #[arg(long, env = "TYPIST_DEVICE_NAME")]
    device_name: Option<String>,

    /// Do not press Enter after typed text.
    #[arg(long, env = "TYPIST_NO_ENTER")]
    no_enter: bool,

    /// How long the chooser scans, in seconds.
    #[arg(long, env = "TYPIST_SCAN_SECS")]
    scan_secs: Option<u64>,
}

impl Cli {
    /// Resolves the config file path: `--config`, else the platform default.
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no --config given and no platform config dir"),
        }
    }

    /// Overrides file values with the ones given on the command line.
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(name) = &self.device_name {
            config.device.name_pattern = name.clone();
        }
        if self.no_enter {
            config.typing.send_with_enter = false;
        }
        if let Some(secs) = self.scan_secs {
            config.device.scan_window_secs = secs;
        }
    }

    /// Opens the state store named by `--state-file`.
    fn open_state_store(&self, config_path: &Path) -> anyhow::Result<Box<dyn StateStore>> {
        match self.state_file.as_deref() {
            Some(EPHEMERAL_STATE) => Ok(Box::new(MemoryStateStore::new())),
            other => {
                let path = other.map_or_else(|| state_file_for(config_path), PathBuf::from);
                let store = TomlStateStore::open(&path)
                    .with_context(|| format!("failed to open state file {}", path.display()))?;
                Ok(Box::new(store))
            }
        }
    }
}

/// Resolves on Ctrl+C.  If the signal cannot be watched, never resolves.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, closing the link"),
        Err(e) => {
            error!("failed to listen for Ctrl+C signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = cli.config_path()?;
    let first_run = !config_path.exists();
    let mut config = load_config_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    cli.apply_overrides(&mut config);

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins when set; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if first_run {
        match save_config_to(&config_path, &AppConfig::default()) {
            Ok(()) => info!(path = %config_path.display(), "wrote default config"),
            Err(e) => warn!("could not write default config: {e}"),
        }
    }

    // ── Durable state ─────────────────────────────────────────────────────────
    let mut store = cli.open_state_store(&config_path)?;
    match store.take_last_error() {
        Ok(Some(message)) => println!("last session ended with an error: {message}"),
        Ok(None) => {}
        Err(e) => warn!("could not read last error: {e}"),
    }

    // ── Session ───────────────────────────────────────────────────────────────
    let backend = BtleplugBackend::new(config.scan_window())
        .await
        .context("failed to open the Bluetooth adapter")?;
    let (handle, mut events, task) =
        SessionController::spawn(Arc::new(backend), store, config.to_session_config());
    info!(pattern = %config.device.name_pattern, "Typist client started");
    handle.resume();

    // ── Console loop ──────────────────────────────────────────────────────────
    println!("type text to send it, /help for commands");
    let stdin = BufReader::new(tokio::io::stdin());
    console::run(stdin, std::io::stdout(), &handle, &mut events, ctrl_c())
        .await
        .context("console I/O failed")?;

    // ── Shutdown ──────────────────────────────────────────────────────────────
    handle.shutdown();
    while let Some(event) = events.recv().await {
        println!("{}", console::render_event(&event));
    }
    if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
        warn!("session did not stop within 5 s");
    }
    info!("Typist client stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
