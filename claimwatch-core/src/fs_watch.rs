//! Live arrival notifications for the watched directory.
//!
//! A thin wrapper around `notify`: the watcher callback forwards raw events
//! over a bounded channel, and a dispatch task turns each arrival into its
//! own pipeline task. Arrivals may therefore be handled concurrently with
//! each other and with an in-flight backlog scan; the claim store is what
//! keeps that safe.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{AccessKind, AccessMode, CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet, spawn_blocking};
use tracing::{debug, info, warn};

use crate::backlog::matches_pattern;
use crate::error::{Result, WorkerError};
use crate::pipeline::ClaimPipeline;

enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// Feeds newly arrived files in one flat directory into a [`ClaimPipeline`].
pub struct WatchDispatcher {
    directory: PathBuf,
    watcher: Option<RecommendedWatcher>,
    dispatch_task: JoinHandle<()>,
}

impl WatchDispatcher {
    /// Start watching `directory` (non-recursively). Returns once the
    /// underlying watcher is live, so anything created afterwards is seen.
    pub async fn start(
        directory: impl Into<PathBuf>,
        extension: impl Into<String>,
        channel_capacity: usize,
        pipeline: Arc<ClaimPipeline>,
    ) -> Result<Self> {
        let directory = directory.into();
        let extension = extension.into();
        let (tx, rx) = mpsc::channel::<WatchMessage>(channel_capacity.max(1));

        let watch_root = directory.clone();
        let watcher = spawn_blocking(move || init_watcher(&watch_root, tx)).await??;

        let dispatch_task = spawn_dispatch_loop(directory.clone(), extension, pipeline, rx);
        info!(directory = %directory.display(), "watching for new files");

        Ok(Self {
            directory,
            watcher: Some(watcher),
            dispatch_task,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Stop accepting notifications and wait for in-flight files to finish.
    pub async fn shutdown(mut self) {
        // Dropping the watcher drops the last sender, which ends the loop.
        self.watcher.take();
        if let Err(err) = (&mut self.dispatch_task).await {
            warn!(error = %err, "watch dispatch task ended abnormally");
        }
    }
}

impl fmt::Debug for WatchDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchDispatcher")
            .field("directory", &self.directory)
            .field("watching", &self.watcher.is_some())
            .field("dispatch_task_finished", &self.dispatch_task.is_finished())
            .finish()
    }
}

fn spawn_dispatch_loop(
    directory: PathBuf,
    extension: String,
    pipeline: Arc<ClaimPipeline>,
    mut rx: mpsc::Receiver<WatchMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut inflight = JoinSet::new();

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    match msg {
                        WatchMessage::Event(event) => {
                            for path in arrivals(&event, &extension) {
                                debug!(path = %path.display(), "arrival notification");
                                let pipeline = Arc::clone(&pipeline);
                                inflight.spawn(async move {
                                    pipeline.handle(&path).await;
                                });
                            }
                        }
                        WatchMessage::Error(error) => {
                            warn!(directory = %directory.display(), error = %error, "watch error");
                        }
                    }
                }
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = %err, "pipeline task ended abnormally");
                    }
                }
            }
        }

        while let Some(joined) = inflight.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "pipeline task ended abnormally");
            }
        }
        debug!(directory = %directory.display(), "watch dispatch loop stopped");
    })
}

// inotify reports when a writer closes a file, so a creation alone is not
// yet an arrival there. Other backends only report the creation.
const CLOSE_WRITE_EVENTS: bool = cfg!(any(target_os = "linux", target_os = "android"));

/// Paths that are ready to be picked up according to `event`: a file whose
/// writer closed it (or its creation, where close events are unavailable),
/// and the destination of a rename into the directory.
fn arrivals(event: &Event, extension: &str) -> Vec<PathBuf> {
    let candidates: Vec<&PathBuf> = match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any | CreateKind::Other)
            if !CLOSE_WRITE_EVENTS =>
        {
            event.paths.iter().collect()
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => event.paths.iter().collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.iter().take(1).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.last().into_iter().collect(),
        _ => Vec::new(),
    };

    candidates
        .into_iter()
        .filter(|path| matches_pattern(path, extension))
        .cloned()
        .collect()
}

fn init_watcher(root: &Path, tx: mpsc::Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let root_display = root.display().to_string();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if let Err(err) = tx.blocking_send(WatchMessage::Event(event)) {
                    warn!("watch channel send failed for {}: {}", root_display, err);
                }
            }
            Err(err) => {
                let _ = tx.blocking_send(WatchMessage::Error(err.to_string()));
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| {
        WorkerError::Watch(format!(
            "failed to create watcher for {}: {}",
            root.display(),
            err
        ))
    })?;

    watcher
        .watch(root, RecursiveMode::NonRecursive)
        .map_err(|err| {
            WorkerError::Watch(format!("failed to watch {}: {}", root.display(), err))
        })?;

    Ok(watcher)
}
