use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stompconf::{Mode, StompConfig};
use stompd::engine::{AudioEngine, DevEngine, RemoteEngine};
use stompd::lastboard::FileLastBoardStore;
use stompd::panel::{ControlPanel, DevPanel, SerialPanel};
use stompd::recording::{DevRecorder, RecordingController};
use stompd::registry::ClientRegistry;
use stompd::Session;

/// Pedalboard session daemon
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (takes precedence over ./stompd.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the state directory
    #[arg(short, long)]
    state_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = StompConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(state_dir) = cli.state_dir {
        config.paths.state_dir = state_dir;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level)),
        )
        .init();

    std::fs::create_dir_all(&config.paths.state_dir)
        .context("Failed to create state directory")?;
    info!(state_dir = %config.paths.state_dir.display(), "stompd starting");

    // Panel: real bridge when configured and reachable, stand-in otherwise.
    let (panel, mut panel_ready): (Arc<dyn ControlPanel>, mpsc::UnboundedReceiver<()>) =
        match config.panel.mode {
            Mode::Real => match SerialPanel::connect(&config.panel.socket).await {
                Ok((panel, ready)) => (panel, ready),
                Err(e) => {
                    warn!(socket = %config.panel.socket.display(), error = %e,
                        "panel bridge unavailable, using stand-in");
                    let (panel, ready) = DevPanel::new();
                    (panel, ready)
                }
            },
            Mode::Dev => {
                let (panel, ready) = DevPanel::new();
                (panel, ready)
            }
        };

    // Engine: same policy.
    let engine: Arc<dyn AudioEngine> = match config.engine.mode {
        Mode::Real => {
            let remote = RemoteEngine::new(config.engine.addr.clone());
            match remote.ensure_connected().await {
                Ok(()) => Arc::new(remote),
                Err(e) => {
                    warn!(addr = %config.engine.addr, error = %e,
                        "plugin host unavailable, using stand-in");
                    Arc::new(DevEngine::new())
                }
            }
        }
        Mode::Dev => Arc::new(DevEngine::new()),
    };

    let registry = Arc::new(ClientRegistry::new());
    let recorder = RecordingController::new(Arc::new(DevRecorder::new()));
    let lastboard = Arc::new(FileLastBoardStore::new(&config.paths.state_dir));

    let session = Arc::new(Mutex::new(Session::new(
        engine,
        panel,
        registry,
        recorder,
        lastboard,
    )));

    // Panel readiness handshake: load the last pedalboard, then complete.
    let handshake_session = session.clone();
    tokio::spawn(async move {
        while panel_ready.recv().await.is_some() {
            let ok = handshake_session.lock().await.panel_ready().await;
            if !ok {
                warn!("panel rejected the ready handshake");
            }
        }
    });

    info!("stompd ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => { sigterm.recv().await; }
                    Err(e) => {
                        warn!(error = %e, "SIGTERM handler unavailable");
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            std::future::pending::<()>().await;
        } => {
            info!("Received SIGTERM, shutting down");
        }
    }

    let mut session = session.lock().await;
    if !session.end_session().await {
        warn!("panel declined the session end handshake");
    }

    Ok(())
}
