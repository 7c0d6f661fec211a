//! Claim-then-process pipeline shared by the backlog scanner and the watch
//! dispatcher.
//!
//! ```text
//! Unseen ─► Claiming ─┬─► Claimed ─► Processing ─┬─► Done
//!                     │                          └─► Failed
//!                     ├─► AlreadyClaimed
//!                     └─► ClaimFailed
//! ```
//!
//! Every terminal state is local to one file: nothing here aborts the worker,
//! retries, or releases a claim.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::claim::{ClaimOutcome, ClaimStore, CompletionLedger, FileId, NoopCompletionLedger};
use crate::processor::{FileProcessor, ProcessError, Processed};

/// Terminal state of one file within one worker run.
#[derive(Debug)]
pub enum FileOutcome {
    /// Claimed and processed; statistics and report were updated.
    Done(Processed),
    /// Claimed, but processing failed. The marker stays, so the file is
    /// never picked up again.
    Failed(ProcessError),
    /// Another caller (or an earlier run) holds the claim.
    AlreadyClaimed,
    /// The marker could not be created; the file is skipped this run.
    ClaimFailed(String),
    /// The path has no usable file name.
    Ignored,
}

impl FileOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, FileOutcome::Done(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileOutcome::Done(_) => "done",
            FileOutcome::Failed(ProcessError::MalformedInput(_)) => "malformed_input",
            FileOutcome::Failed(ProcessError::ReadFailure(_)) => "read_failure",
            FileOutcome::AlreadyClaimed => "already_claimed",
            FileOutcome::ClaimFailed(_) => "claim_failed",
            FileOutcome::Ignored => "ignored",
        }
    }
}

/// Observer hook for per-file outcomes. Nothing is surfaced by default.
pub trait PipelineObserver: Send + Sync {
    fn on_outcome(&self, path: &Path, outcome: &FileOutcome);
}

/// No-op observer used when nothing is wired up.
pub struct NoopPipelineObserver;

impl PipelineObserver for NoopPipelineObserver {
    fn on_outcome(&self, _path: &Path, _outcome: &FileOutcome) {}
}

impl fmt::Debug for NoopPipelineObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopPipelineObserver")
    }
}

/// Per-outcome totals for one pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub done: u64,
    pub failed: u64,
    pub already_claimed: u64,
    pub claim_failed: u64,
    pub ignored: u64,
}

#[derive(Default)]
struct Counters {
    done: AtomicU64,
    failed: AtomicU64,
    already_claimed: AtomicU64,
    claim_failed: AtomicU64,
    ignored: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &FileOutcome) {
        let counter = match outcome {
            FileOutcome::Done(_) => &self.done,
            FileOutcome::Failed(_) => &self.failed,
            FileOutcome::AlreadyClaimed => &self.already_claimed,
            FileOutcome::ClaimFailed(_) => &self.claim_failed,
            FileOutcome::Ignored => &self.ignored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> OutcomeCounts {
        OutcomeCounts {
            done: self.done.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            already_claimed: self.already_claimed.load(Ordering::Relaxed),
            claim_failed: self.claim_failed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

/// Funnels file paths from any producer through claim → process.
pub struct ClaimPipeline {
    store: Arc<dyn ClaimStore>,
    processor: Arc<FileProcessor>,
    completions: Arc<dyn CompletionLedger>,
    observer: Arc<dyn PipelineObserver>,
    // Serialises local claim+process when set. Cross-producer and
    // cross-process dedup come from the claim store alone.
    gate: Option<Mutex<()>>,
    counters: Counters,
}

impl ClaimPipeline {
    pub fn new(store: Arc<dyn ClaimStore>, processor: Arc<FileProcessor>) -> Self {
        Self {
            store,
            processor,
            completions: Arc::new(NoopCompletionLedger),
            observer: Arc::new(NoopPipelineObserver),
            gate: None,
            counters: Counters::default(),
        }
    }

    /// Hold an in-process gate across claim+process.
    pub fn serialized(mut self, enabled: bool) -> Self {
        self.gate = enabled.then(|| Mutex::new(()));
        self
    }

    pub fn with_completions(mut self, completions: Arc<dyn CompletionLedger>) -> Self {
        self.completions = completions;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn processor(&self) -> &Arc<FileProcessor> {
        &self.processor
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.counters.snapshot()
    }

    /// Drive one file to a terminal state.
    pub async fn handle(&self, path: &Path) -> FileOutcome {
        let outcome = match FileId::from_path(path) {
            Some(id) => self.claim_and_process(&id, path).await,
            None => FileOutcome::Ignored,
        };

        self.counters.record(&outcome);
        match &outcome {
            FileOutcome::Done(processed) => debug!(
                target: "claimwatch::pipeline",
                path = %path.display(),
                duration = processed.duration,
                sum_of_squares = processed.sum_of_squares,
                "processed"
            ),
            FileOutcome::Failed(err) => debug!(
                target: "claimwatch::pipeline",
                path = %path.display(),
                error = %err,
                "processing failed; claim retained"
            ),
            FileOutcome::ClaimFailed(reason) => debug!(
                target: "claimwatch::pipeline",
                path = %path.display(),
                reason = %reason,
                "claim failed; skipped"
            ),
            other => debug!(
                target: "claimwatch::pipeline",
                path = %path.display(),
                outcome = other.label(),
                "skipped"
            ),
        }
        self.observer.on_outcome(path, &outcome);
        outcome
    }

    async fn claim_and_process(&self, id: &FileId, path: &Path) -> FileOutcome {
        let _gate = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        match self.store.claim(id).await {
            ClaimOutcome::Claimed => match self.processor.process(path).await {
                Ok(processed) => {
                    if let Err(err) = self.completions.record_done(id).await {
                        warn!(file = %id, error = %err, "failed to record completion");
                    }
                    FileOutcome::Done(processed)
                }
                Err(err) => FileOutcome::Failed(err),
            },
            ClaimOutcome::AlreadyClaimed => FileOutcome::AlreadyClaimed,
            ClaimOutcome::ClaimFailed(reason) => FileOutcome::ClaimFailed(reason),
        }
    }
}

impl fmt::Debug for ClaimPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimPipeline")
            .field("serialized", &self.gate.is_some())
            .field("counts", &self.counters.snapshot())
            .finish()
    }
}
