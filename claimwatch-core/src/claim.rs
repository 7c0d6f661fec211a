//! Exactly-once claim protocol.
//!
//! A claim is a zero-length `<id>.lock` file created with exclusive-create
//! semantics inside the lock directory. The filesystem primitive is the only
//! authority: two callers (threads, tasks, or processes sharing the volume)
//! can never both create the same marker. Markers are write-once and are
//! never removed, so the claimed set only grows.

use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use crate::error::{Result, WorkerError};

const LOCK_SUFFIX: &str = "lock";
const DONE_SUFFIX: &str = "done";

/// Base name of a file in the watched directory. The dedup key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(String);

impl FileId {
    /// Accepts a bare file name. Anything that could escape the lock
    /// directory (separators, `.`/`..`, NUL) is rejected.
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
        {
            return None;
        }
        Some(Self(name))
    }

    /// Identifier for `path`, taken from its final component.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| Self::new(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn marker_name(&self, suffix: &str) -> String {
        format!("{}.{}", self.0, suffix)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a single claim attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The marker was created by this call; the caller owns the file.
    Claimed,
    /// The marker already existed. Expected under duplicate delivery.
    AlreadyClaimed,
    /// The marker could not be created for any other reason.
    ClaimFailed(String),
}

/// Durable, append-only record of claimed identifiers.
///
/// Implementations must make `claim` atomic with respect to "does the marker
/// exist": for a given id at most one caller across every process sharing
/// the store may ever observe [`ClaimOutcome::Claimed`]. There is
/// deliberately no release operation.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn claim(&self, id: &FileId) -> ClaimOutcome;
}

/// Filesystem-backed claim store: one `<id>.lock` marker per claimed id.
pub struct MarkerClaimStore {
    root: PathBuf,
    // Positive cache only. An id lands here after its marker is known to
    // exist, so a hit can short-circuit to AlreadyClaimed; a miss always
    // goes to the filesystem.
    known: DashSet<FileId>,
}

impl MarkerClaimStore {
    /// Open (creating if absent) the lock directory at `root`.
    ///
    /// Markers left by earlier runs are honoured: those files count as
    /// already processed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|err| {
            WorkerError::LockStorage(format!(
                "failed to create lock directory {}: {}",
                root.display(),
                err
            ))
        })?;
        info!(lock_dir = %root.display(), "claim store ready");
        Ok(Self {
            root,
            known: DashSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the marker that records a claim on `id`.
    pub fn marker_path(&self, id: &FileId) -> PathBuf {
        self.root.join(id.marker_name(LOCK_SUFFIX))
    }

    /// Whether a marker for `id` exists on disk right now.
    pub async fn is_claimed(&self, id: &FileId) -> bool {
        if self.known.contains(id) {
            return true;
        }
        tokio::fs::try_exists(self.marker_path(id))
            .await
            .unwrap_or(false)
    }
}

#[async_trait]
impl ClaimStore for MarkerClaimStore {
    async fn claim(&self, id: &FileId) -> ClaimOutcome {
        if self.known.contains(id) {
            return ClaimOutcome::AlreadyClaimed;
        }

        let path = self.marker_path(id);
        let created = spawn_blocking(move || create_marker(&path)).await;

        match created {
            Ok(Ok(())) => {
                self.known.insert(id.clone());
                debug!(file = %id, "claimed");
                ClaimOutcome::Claimed
            }
            Ok(Err(err)) if err.kind() == io::ErrorKind::AlreadyExists => {
                self.known.insert(id.clone());
                ClaimOutcome::AlreadyClaimed
            }
            Ok(Err(err)) => ClaimOutcome::ClaimFailed(err.to_string()),
            Err(join_err) => {
                ClaimOutcome::ClaimFailed(format!("marker creation panicked: {join_err}"))
            }
        }
    }
}

impl fmt::Debug for MarkerClaimStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerClaimStore")
            .field("root", &self.root)
            .field("known", &self.known.len())
            .finish()
    }
}

/// Exclusive create with write-through where the platform offers it.
fn create_marker(path: &Path) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_SYNC);
    }

    let file = options.open(path)?;
    file.sync_all()
}

/// Hook invoked after a claimed file was processed successfully.
///
/// The claim marker alone cannot tell "claimed" apart from "processed", so a
/// file that failed after its claim is skipped forever. Implementations can
/// record completion separately; nothing in the pipeline reads it back.
#[async_trait]
pub trait CompletionLedger: Send + Sync {
    async fn record_done(&self, id: &FileId) -> io::Result<()>;
}

/// Records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCompletionLedger;

#[async_trait]
impl CompletionLedger for NoopCompletionLedger {
    async fn record_done(&self, _id: &FileId) -> io::Result<()> {
        Ok(())
    }
}

/// Writes a zero-length `<id>.done` marker next to the claim marker.
#[derive(Debug, Clone)]
pub struct DoneMarkerLedger {
    root: PathBuf,
}

impl DoneMarkerLedger {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn done_path(&self, id: &FileId) -> PathBuf {
        self.root.join(id.marker_name(DONE_SUFFIX))
    }

    pub async fn is_done(&self, id: &FileId) -> bool {
        tokio::fs::try_exists(self.done_path(id))
            .await
            .unwrap_or(false)
    }
}

#[async_trait]
impl CompletionLedger for DoneMarkerLedger {
    async fn record_done(&self, id: &FileId) -> io::Result<()> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.done_path(id))
            .await?;
        file.sync_all().await
    }
}
