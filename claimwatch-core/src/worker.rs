//! Wires the claim store, processor, reporter and both producers together.

use std::fmt;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::backlog::{BacklogSummary, scan_once};
use crate::claim::{DoneMarkerLedger, MarkerClaimStore};
use crate::config::{ReportSinkKind, WorkerConfig};
use crate::error::{Result, WorkerError};
use crate::fs_watch::WatchDispatcher;
use crate::pipeline::{ClaimPipeline, NoopPipelineObserver, OutcomeCounts, PipelineObserver};
use crate::processor::{FileProcessor, SleepWork, WorkSimulator};
use crate::report::{ReportSink, Reporter, TextSink, TracingSink};

/// Builder for one worker instance over one watched directory.
pub struct Worker {
    directory: PathBuf,
    config: WorkerConfig,
    watch: bool,
    sink: Option<Arc<dyn ReportSink>>,
    work: Option<Arc<dyn WorkSimulator>>,
    observer: Arc<dyn PipelineObserver>,
}

impl Worker {
    pub fn new(directory: impl Into<PathBuf>, config: WorkerConfig) -> Self {
        Self {
            directory: directory.into(),
            config,
            watch: true,
            sink: None,
            work: None,
            observer: Arc::new(NoopPipelineObserver),
        }
    }

    /// Skip live notifications: run the backlog pass only.
    pub fn watch(mut self, enabled: bool) -> Self {
        self.watch = enabled;
        self
    }

    /// Override the sink selected by `config.report_sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the sleep-based work simulation.
    pub fn with_work(mut self, work: Arc<dyn WorkSimulator>) -> Self {
        self.work = Some(work);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Prepare lock storage, start watching, then run the backlog pass.
    ///
    /// The watcher goes live before the directory is listed so nothing that
    /// lands during the scan is missed; a file seen by both paths is settled
    /// by the claim store. Only setup failures are returned as errors.
    pub async fn start(self) -> Result<WorkerHandle> {
        self.config.validate()?;

        let metadata = tokio::fs::metadata(&self.directory).await.map_err(|err| {
            WorkerError::Scan(format!(
                "cannot access {}: {}",
                self.directory.display(),
                err
            ))
        })?;
        if !metadata.is_dir() {
            return Err(WorkerError::Scan(format!(
                "{} is not a directory",
                self.directory.display()
            )));
        }

        let store = MarkerClaimStore::open(&self.config.lock_dir).await?;

        let interval = NonZeroU64::new(self.config.report_interval)
            .ok_or_else(|| WorkerError::Config("report_interval must be at least 1".into()))?;
        let sink = self
            .sink
            .unwrap_or_else(|| default_sink(self.config.report_sink));
        let work: Arc<dyn WorkSimulator> = match self.work {
            Some(work) => work,
            None => Arc::new(SleepWork::new(self.config.seconds_per_unit)),
        };
        let processor = FileProcessor::new(work, Reporter::new(interval, sink));

        let mut pipeline = ClaimPipeline::new(Arc::new(store), Arc::new(processor))
            .serialized(self.config.serialize_processing)
            .with_observer(self.observer);
        if self.config.record_completions {
            pipeline = pipeline.with_completions(Arc::new(DoneMarkerLedger::new(
                &self.config.lock_dir,
            )));
        }
        let pipeline = Arc::new(pipeline);

        let extension = self.config.normalized_extension().to_string();
        let dispatcher = if self.watch {
            Some(
                WatchDispatcher::start(
                    &self.directory,
                    extension.clone(),
                    self.config.watch_channel_capacity,
                    Arc::clone(&pipeline),
                )
                .await?,
            )
        } else {
            None
        };

        let backlog = scan_once(&self.directory, &extension, &pipeline).await?;

        Ok(WorkerHandle {
            directory: self.directory,
            pipeline,
            dispatcher,
            backlog,
        })
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("directory", &self.directory)
            .field("config", &self.config)
            .field("watch", &self.watch)
            .finish()
    }
}

fn default_sink(kind: ReportSinkKind) -> Arc<dyn ReportSink> {
    match kind {
        ReportSinkKind::Text => Arc::new(TextSink::stdout()),
        ReportSinkKind::Tracing => Arc::new(TracingSink),
    }
}

/// A running worker.
pub struct WorkerHandle {
    directory: PathBuf,
    pipeline: Arc<ClaimPipeline>,
    dispatcher: Option<WatchDispatcher>,
    backlog: BacklogSummary,
}

impl WorkerHandle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Result of the startup backlog pass.
    pub fn backlog(&self) -> BacklogSummary {
        self.backlog
    }

    pub fn pipeline(&self) -> &Arc<ClaimPipeline> {
        &self.pipeline
    }

    pub fn is_watching(&self) -> bool {
        self.dispatcher.is_some()
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.pipeline.counts()
    }

    /// Stop the watcher, wait for in-flight files, and return final totals.
    pub async fn shutdown(self) -> OutcomeCounts {
        if let Some(dispatcher) = self.dispatcher {
            dispatcher.shutdown().await;
        }
        let counts = self.pipeline.counts();
        info!(
            directory = %self.directory.display(),
            processed = counts.done,
            failed = counts.failed,
            already_claimed = counts.already_claimed,
            claim_failed = counts.claim_failed,
            "worker stopped"
        );
        counts
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("directory", &self.directory)
            .field("watching", &self.dispatcher.is_some())
            .field("backlog", &self.backlog)
            .field("counts", &self.pipeline.counts())
            .finish()
    }
}
