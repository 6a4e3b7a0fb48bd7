use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, error, info, warn};

use crate::error::{PlayoutError, Result};
use crate::ingest;
use crate::output::{encoder_command, ffmpeg_binary};
use crate::source::{NodeProvider, PlayoutContext};

const COPY_CHUNK: usize = 65536;
/// No live bytes for this long means the live session is over and scheduled
/// playback resumes.
const LIVE_IDLE: Duration = Duration::from_secs(1);

/// Forward a child's stderr into the log, classifying lines by severity.
pub fn drain_stderr(role: &'static str, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let lower = line.to_ascii_lowercase();
            if lower.contains("error") || lower.contains("fatal") {
                error!(role, "{line}");
            } else if lower.contains("warning") {
                warn!(role, "{line}");
            } else {
                debug!(role, "{line}");
            }
        }
    });
}

/// One subprocess under engine control: scoped start, stderr drained into
/// the log, and killed on drop so no exit path leaks a child.
pub struct ManagedChild {
    role: &'static str,
    pub child: Child,
}

impl ManagedChild {
    pub fn spawn(
        role: &'static str,
        program: &str,
        args: &[String],
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        if let Some(stderr) = child.stderr.take() {
            drain_stderr(role, stderr);
        }
        debug!(role, program, "spawned");
        Ok(Self { role, child })
    }

    pub async fn terminate(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        debug!(role = self.role, "terminated");
    }
}

async fn write_chunk(encoder_in: &mut ChildStdin, chunk: &[u8]) -> Result<()> {
    encoder_in
        .write_all(chunk)
        .await
        .map_err(|e| PlayoutError::BrokenPipe(format!("encoder stdin: {e}")))
}

async fn wait_interrupt(interrupt: &Option<Arc<Notify>>) {
    match interrupt {
        Some(notify) => notify.notified().await,
        None => std::future::pending().await,
    }
}

/// Run the playout pipeline: one long-lived encoder, one decoder per node,
/// byte-copied together, with optional live-ingest preemption.
///
/// Every exit path converges here: the provider's cleanup hook runs, the
/// encoder's stdin is closed, and the encoder is waited on during normal
/// shutdown but killed outright after an error.
pub async fn run(
    ctx: Arc<PlayoutContext>,
    mut provider: NodeProvider,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (program, args) = encoder_command(&ctx.settings);
    info!(%program, mode = ?ctx.settings.out.mode, "starting encoder");
    let mut encoder = ManagedChild::spawn("encoder", &program, &args, Stdio::piped(), Stdio::inherit())?;
    let Some(mut encoder_in) = encoder.child.stdin.take() else {
        encoder.terminate().await;
        return Err(PlayoutError::BrokenPipe("encoder stdin unavailable".into()));
    };

    let live_enabled = ctx.settings.ingest.enable;
    let mut live_rx = if live_enabled {
        ingest::spawn_listener(ctx.settings.clone(), shutdown.clone())
    } else {
        mpsc::unbounded_channel().1
    };

    let result = stream_nodes(
        &mut provider,
        &mut encoder_in,
        &mut live_rx,
        live_enabled,
        shutdown,
    )
    .await;

    provider.stop();
    drop(encoder_in);
    match &result {
        Ok(()) => {
            let _ = encoder.child.wait().await;
            info!("encoder finished");
        }
        Err(e) => {
            error!("terminating after error: {e}");
            encoder.terminate().await;
        }
    }
    result
}

async fn stream_nodes(
    provider: &mut NodeProvider,
    encoder_in: &mut ChildStdin,
    live_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    live_enabled: bool,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut live_on = live_enabled;
    let mut live_active = false;

    'nodes: loop {
        if *shutdown.borrow() {
            return Ok(());
        }
        // The provider may wait on an empty folder or a slow playlist
        // fetch; termination must still be observed while it is pending.
        let node = tokio::select! {
            biased;
            _ = shutdown.changed() => return Ok(()),
            node = provider.next_node() => node?,
        };
        let mut decoder = ManagedChild::spawn(
            "decoder",
            &ffmpeg_binary(),
            &node.decoder_arguments,
            Stdio::null(),
            Stdio::piped(),
        )?;
        let Some(mut decoder_out) = decoder.child.stdout.take() else {
            decoder.terminate().await;
            return Err(PlayoutError::BrokenPipe("decoder stdout unavailable".into()));
        };
        let interrupt = provider.interrupt();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    decoder.terminate().await;
                    return Ok(());
                }
                // Live bytes preempt the schedule: the current decoder is
                // killed once, its remaining output discarded, and the live
                // stream takes the encoder until it falls silent.
                chunk = live_rx.recv(), if live_on => match chunk {
                    Some(chunk) => {
                        if !live_active {
                            live_active = true;
                            info!("live ingest active, preempting schedule");
                            decoder.terminate().await;
                        }
                        write_chunk(encoder_in, &chunk).await?;
                    }
                    None => {
                        warn!("ingest listener gone, disabling live input");
                        live_on = false;
                    }
                },
                _ = tokio::time::sleep(LIVE_IDLE), if live_active => {
                    live_active = false;
                    provider.rearm_live_seek();
                    info!("live source ended, resuming schedule");
                    continue 'nodes;
                }
                _ = wait_interrupt(&interrupt), if interrupt.is_some() => {
                    warn!(source = %node.source, "current file removed, advancing");
                    decoder.terminate().await;
                    continue 'nodes;
                }
                read = decoder_out.read(&mut buf), if !live_active => match read {
                    Ok(0) => break,
                    Ok(n) => write_chunk(encoder_in, &buf[..n]).await?,
                    Err(e) => {
                        warn!(source = %node.source, "decoder read failed: {e}");
                        break;
                    }
                },
            }
        }
        let _ = decoder.child.wait().await;
    }
}
