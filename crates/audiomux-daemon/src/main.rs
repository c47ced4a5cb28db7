// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Entry point: wires configuration, the audio-thread scheduler, and
//! graceful shutdown together. The connection-accept/control-message main
//! loop itself is a named non-goal — this binary brings up the
//! internal machinery and blocks on shutdown signals rather than running a
//! production socket server.

mod bus;
mod config;
mod device;
mod devstream;
mod error;
mod floop;
mod metrics;
mod scheduler;
mod stream;

use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use bus::{AudioToMain, MainToAudio};
use config::ConfigManager;
use error::DaemonError;
use scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "audiomuxd", about = "AudioMux audio server daemon")]
struct Cli {
    /// Override the config file's search path (still resolved under
    /// `ProjectDirs`; this only changes the directory consulted).
    #[arg(long)]
    config_dir: Option<std::path::PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Spawns the audio thread as a plain OS thread, never a tokio task, and
/// returns its join handle plus the channel endpoints the main runtime talks
/// to it through.
fn spawn_audio_thread() -> (thread::JoinHandle<()>, crossbeam_channel::Sender<MainToAudio>, crossbeam_channel::Receiver<AudioToMain>) {
    let (to_audio_tx, to_audio_rx) = crossbeam_channel::unbounded::<MainToAudio>();
    let (to_main_tx, to_main_rx) = crossbeam_channel::unbounded::<AudioToMain>();

    let handle = thread::Builder::new()
        .name("audio".to_string())
        .spawn(move || {
            let mut scheduler = Scheduler::new(to_audio_rx, to_main_tx);
            let started = Instant::now();
            loop {
                let now = started.elapsed();
                let wait = scheduler.tick(now);
                if scheduler.is_stopped() {
                    tracing::info!("audio thread: stop flag observed, exiting");
                    break;
                }
                thread::sleep(wait.min(Duration::from_millis(10)));
            }
        })
        .expect("failed to spawn audio thread");

    (handle, to_audio_tx, to_main_rx)
}

/// Drains reset-request / underrun / busyloop notifications posted by the
/// audio thread; a production build would fan these into the metrics sink
/// and the device-reopen path (both named non-goals here).
fn drain_audio_events(rx: &crossbeam_channel::Receiver<AudioToMain>) {
    for event in rx.try_iter() {
        match event {
            AudioToMain::ResetRequest { device_idx, reason } => {
                tracing::warn!(device_idx, %reason, "device reset requested");
            }
            AudioToMain::SevereUnderrun { device_idx } => {
                tracing::error!(device_idx, "severe underrun");
            }
            AudioToMain::Underrun { device_idx } => {
                tracing::warn!(device_idx, "underrun");
            }
            AudioToMain::BusyloopEvent => {
                tracing::warn!("busyloop detected in audio thread");
            }
            AudioToMain::StateChanged(kind) => {
                tracing::debug!(?kind, "state changed");
            }
        }
    }
}

async fn run(cli: Cli) -> Result<(), DaemonError> {
    let config_manager = ConfigManager::new()?;
    let server_config = config_manager.load()?;
    tracing::info!(config_dir = ?cli.config_dir, scheduling = ?server_config.scheduling, "starting audiomuxd");

    let (audio_handle, to_audio_tx, to_main_rx) = spawn_audio_thread();

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| DaemonError::Fatal(format!("failed to install SIGTERM handler: {e}")))?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                drain_audio_events(&to_main_rx);
            }
        }
    }

    let _ = to_audio_tx.send(MainToAudio::Stop);
    match tokio::time::timeout(Duration::from_secs(2), tokio::task::spawn_blocking(move || audio_handle.join())).await {
        Ok(Ok(Ok(()))) => tracing::info!("audio thread joined cleanly"),
        Ok(Ok(Err(_))) => tracing::error!("audio thread panicked"),
        Ok(Err(e)) => tracing::error!(%e, "audio thread join task failed"),
        Err(_) => tracing::warn!("audio thread did not join within the shutdown timeout"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            std::process::ExitCode::FAILURE
        }
    }
}
