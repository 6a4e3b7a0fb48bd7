use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod error;
mod filters;
mod folder;
mod ingest;
mod node;
mod output;
mod play;
mod probe;
mod scheduler;
mod source;
mod sync;

use config::Settings;
use error::RateGate;
use filters::FilterRegistry;
use folder::FolderSource;
use scheduler::Scheduler;
use source::{NodeProvider, PlayoutContext};
use sync::SyncState;

fn init_logging(settings: &Settings) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    match &settings.logging.path {
        Some(path) => {
            let (dir, prefix) = if path.is_dir() {
                (path.as_path(), "aircast.log".to_string())
            } else {
                (
                    path.parent().unwrap_or_else(|| Path::new(".")),
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "aircast.log".into()),
                )
            };
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, prefix));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("sigterm handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    warn!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let config_found = args.config.is_file();
    let mut settings = if config_found {
        Settings::load(&args.config)?
    } else {
        let mut defaults = Settings::default();
        defaults.finalize()?;
        defaults
    };
    settings.apply_args(&args)?;

    let _log_guard = init_logging(&settings);
    info!(version = env!("CARGO_PKG_VERSION"), "aircast starting");
    if !config_found {
        warn!(
            config = %args.config.display(),
            "configuration file not found, running on defaults"
        );
    }

    let folder_mode = settings.folder_mode(&args);
    let settings = Arc::new(settings);
    let ctx = Arc::new(PlayoutContext {
        settings: settings.clone(),
        // Custom filter stages are registered here before the run begins.
        registry: FilterRegistry::default(),
        // Only playlist mode carries a wall-clock contract worth pacing to.
        sync: Arc::new(SyncState::new(!folder_mode)),
        gate: RateGate::new(Duration::from_secs(settings.logging.dedup_seconds)),
    });

    let provider = if folder_mode {
        info!(path = %settings.storage.path.display(), "folder mode");
        NodeProvider::Folder(FolderSource::new(ctx.clone()))
    } else {
        info!(
            day_start = %settings.playlist.day_start,
            "playlist mode"
        );
        NodeProvider::Playlist(Scheduler::new(ctx.clone()))
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    if let Err(e) = play::run(ctx, provider, shutdown_rx).await {
        error!("playout terminated: {e}");
        std::process::exit(1);
    }
    info!("shutdown complete");
    Ok(())
}
