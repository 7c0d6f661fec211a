//! # Claimwatch Core
//!
//! Exactly-once ingestion of data files dropped into a directory.
//!
//! ## Overview
//!
//! Two independent producers discover files:
//!
//! - [`backlog`]: a one-shot listing of files already present at startup
//! - [`fs_watch`]: live arrival notifications from `notify`
//!
//! Both push paths into the same [`pipeline::ClaimPipeline`], which claims
//! each file through a [`claim::ClaimStore`] before processing it. The
//! filesystem marker store makes the claim atomic across tasks, restarts,
//! and worker processes sharing the lock directory, so the order in which
//! the producers see a file only decides which one wins the claim.
//!
//! A processed file contributes its declared duration to a
//! [`stats::RollingSquaredDifferences`] accumulator and to a rate-limited
//! [`report::Reporter`].
//!
//! ## Example
//!
//! ```no_run
//! use claimwatch_core::{Worker, WorkerConfig};
//!
//! async fn run() -> claimwatch_core::Result<()> {
//!     let config = WorkerConfig {
//!         seconds_per_unit: 0.001,
//!         ..WorkerConfig::default()
//!     };
//!     let handle = Worker::new("/data/incoming", config).start().await?;
//!     println!("backlog: {:?}", handle.backlog());
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Startup scan of files already in the directory
pub mod backlog;

/// Exactly-once claim markers and the completion-ledger extension point
pub mod claim;

/// Worker configuration with serde defaults
pub mod config;

/// Error types for worker-fatal failures
pub mod error;

/// `notify`-backed arrival dispatcher
pub mod fs_watch;

/// Claim-then-process state machine
pub mod pipeline;

/// Duration parsing and simulated work
pub mod processor;

/// Periodic aggregate reports and their sinks
pub mod report;

/// O(1) cumulative sum of squared differences
pub mod stats;

/// Startup/shutdown orchestration
pub mod worker;

pub use claim::{ClaimOutcome, ClaimStore, FileId, MarkerClaimStore};
pub use config::{ReportSinkKind, WorkerConfig};
pub use error::{Result, WorkerError};
pub use pipeline::{ClaimPipeline, FileOutcome, OutcomeCounts};
pub use worker::{Worker, WorkerHandle};
