use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::output::ffmpeg_binary;
use crate::play::drain_stderr;
use crate::source::pipe_format_args;

const READ_CHUNK: usize = 65536;
const RESPAWN_DELAY: Duration = Duration::from_secs(1);

fn listener_arguments(settings: &Settings) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-v".to_string(),
        settings.logging.ffmpeg_level.clone(),
    ];
    args.extend(
        settings
            .ingest
            .input_param
            .split_whitespace()
            .map(str::to_string),
    );
    args.extend(pipe_format_args(settings));
    args
}

/// Start the live-ingest listener: a persistent ffmpeg process waiting for
/// an incoming stream and re-encoding it onto the same pipe format the
/// decoders use. Its bytes arrive on the returned channel; the listener is
/// respawned after every session until shutdown.
pub fn spawn_listener(
    settings: Arc<Settings>,
    mut shutdown: watch::Receiver<bool>,
) -> mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            if *shutdown.borrow() {
                return;
            }
            let args = listener_arguments(&settings);
            let mut child = match Command::new(ffmpeg_binary())
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
            {
                Ok(child) => child,
                Err(e) => {
                    error!("failed to start ingest listener: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };
            info!("ingest listener waiting for live source");
            if let Some(stderr) = child.stderr.take() {
                drain_stderr("ingest", stderr);
            }
            let Some(mut stdout) = child.stdout.take() else {
                let _ = child.kill().await;
                return;
            };

            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        let _ = child.kill().await;
                        return;
                    }
                    read = stdout.read(&mut buf) => match read {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                // orchestrator is gone
                                let _ = child.kill().await;
                                return;
                            }
                        }
                        Err(e) => {
                            warn!("ingest read failed: {e}");
                            break;
                        }
                    }
                }
            }
            let _ = child.wait().await;
            debug!("ingest session ended, restarting listener");
            tokio::time::sleep(RESPAWN_DELAY).await;
        }
    });

    rx
}
