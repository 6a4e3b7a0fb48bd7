use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::node::ClipNode;
use crate::scheduler::{time_in_seconds, MINIMAL_LENGTH};
use crate::source::{self, PlayoutContext};

const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Completeness check for files that are still being written: a file is
/// admitted only once its size holds steady across two consecutive polls.
#[derive(Default)]
struct Admission {
    pending: HashMap<PathBuf, u64>,
}

impl Admission {
    fn observe(&mut self, path: &Path, size: u64) -> bool {
        match self.pending.get(path) {
            Some(previous) if *previous == size => {
                self.pending.remove(path);
                true
            }
            _ => {
                self.pending.insert(path.to_path_buf(), size);
                false
            }
        }
    }
}

fn scan_media(root: &Path, extensions: &[String]) -> Vec<(PathBuf, u64)> {
    let mut found = Vec::new();
    collect(root, extensions, &mut found);
    found
}

fn collect(dir: &Path, extensions: &[String], out: &mut Vec<(PathBuf, u64)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(&path, extensions, out);
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)) {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                out.push((path, size));
            }
        }
    }
}

fn order(list: &mut [PathBuf], shuffle: bool) {
    if shuffle {
        fastrand::shuffle(list);
    } else {
        list.sort();
    }
}

/// Fold one scan into the shared list: drop files that vanished, admit new
/// ones that passed the size-stability check. Returns whether the list
/// changed.
fn reconcile(
    list: &mut Vec<PathBuf>,
    found: &[(PathBuf, u64)],
    admission: &mut Admission,
) -> bool {
    let before = list.len();
    list.retain(|known| found.iter().any(|(path, _)| path == known));
    let mut changed = list.len() != before;

    for (path, size) in found {
        if !list.contains(path) && admission.observe(path, *size) {
            list.push(path.clone());
            changed = true;
        }
    }
    changed
}

/// Time-agnostic media provider: an endless, restartable cycle over the
/// files under the storage root, sorted or shuffled. No wall-clock
/// contract; "next" is simply the next available file.
pub struct FolderSource {
    ctx: Arc<PlayoutContext>,
    files: Arc<Mutex<Vec<PathBuf>>>,
    current: Arc<Mutex<Option<PathBuf>>>,
    interrupt: Arc<Notify>,
    watcher: JoinHandle<()>,
    index: usize,
    sequence: usize,
    previous: Option<ClipNode>,
}

impl FolderSource {
    pub fn new(ctx: Arc<PlayoutContext>) -> Self {
        let storage = &ctx.settings.storage;
        let mut initial: Vec<PathBuf> = scan_media(&storage.path, &storage.extensions)
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        order(&mut initial, storage.shuffle);
        info!(
            path = %storage.path.display(),
            count = initial.len(),
            "media folder scanned"
        );

        let files = Arc::new(Mutex::new(initial));
        let current = Arc::new(Mutex::new(None));
        let interrupt = Arc::new(Notify::new());
        let watcher = tokio::spawn(watch_loop(
            ctx.clone(),
            files.clone(),
            current.clone(),
            interrupt.clone(),
        ));

        Self {
            ctx,
            files,
            current,
            interrupt,
            watcher,
            index: 0,
            sequence: 0,
            previous: None,
        }
    }

    pub async fn next_node(&mut self) -> Result<ClipNode> {
        loop {
            let path = loop {
                {
                    let mut list = self.files.lock().unwrap_or_else(|e| e.into_inner());
                    if !list.is_empty() {
                        if self.index >= list.len() {
                            self.index = 0;
                            if self.ctx.settings.storage.shuffle {
                                fastrand::shuffle(list.as_mut_slice());
                            }
                            debug!("media list exhausted, restarting cycle");
                        }
                        break list[self.index].clone();
                    }
                }
                if self.ctx.gate.allow("empty media folder") {
                    warn!("no playable files in media folder, waiting");
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            };
            self.index += 1;

            let mut node = ClipNode {
                source: path.to_string_lossy().into_owned(),
                scheduled_begin: time_in_seconds(),
                sequence_number: self.sequence,
                ..Default::default()
            };
            self.sequence += 1;
            *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(path);

            source::prepare_node(&self.ctx, &mut node, self.previous.as_ref(), None);
            if node.effective_length() < MINIMAL_LENGTH {
                warn!(source = %node.source, "unplayable file, advancing");
                continue;
            }
            info!(source = %node.source, length = node.effective_length(), "play");
            self.previous = Some(node.clone());
            return Ok(node);
        }
    }

    pub fn interrupt(&self) -> Arc<Notify> {
        self.interrupt.clone()
    }

    pub fn stop(&self) {
        self.watcher.abort();
    }
}

async fn watch_loop(
    ctx: Arc<PlayoutContext>,
    files: Arc<Mutex<Vec<PathBuf>>>,
    current: Arc<Mutex<Option<PathBuf>>>,
    interrupt: Arc<Notify>,
) {
    let storage = &ctx.settings.storage;
    let mut admission = Admission::default();
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let found = scan_media(&storage.path, &storage.extensions);

        {
            let mut list = files.lock().unwrap_or_else(|e| e.into_inner());
            if reconcile(&mut list, &found, &mut admission) {
                order(&mut list, storage.shuffle);
                debug!(count = list.len(), "media list updated");
            }
        }

        let mut current = current.lock().unwrap_or_else(|e| e.into_inner());
        let removed = current
            .as_ref()
            .map(|playing| !found.iter().any(|(path, _)| path == playing))
            .unwrap_or(false);
        if removed {
            warn!(source = ?current, "currently playing file disappeared");
            *current = None;
            interrupt.notify_waiters();
        }
    }
}
