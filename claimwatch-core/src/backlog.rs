//! One-shot enumeration of files already present when the worker starts.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, WorkerError};
use crate::pipeline::{ClaimPipeline, FileOutcome, OutcomeCounts};

/// Totals for a single backlog pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BacklogSummary {
    /// Matching files found in the directory listing.
    pub discovered: usize,
    /// How each discovered file ended up.
    pub outcomes: OutcomeCounts,
}

/// Whether `path` names a data file this worker handles: `*.<extension>`,
/// hidden files excluded.
pub fn matches_pattern(path: &Path, extension: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == extension)
}

/// Flat listing of regular files in `directory` matching the pattern,
/// sorted by name.
pub async fn list_matching(directory: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(directory).await.map_err(|err| {
        WorkerError::Scan(format!(
            "failed to list {}: {}",
            directory.display(),
            err
        ))
    })?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !matches_pattern(&path, extension) {
            continue;
        }
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => paths.push(path),
            // Directories named `*.txt`, or files gone since the listing.
            _ => {}
        }
    }
    paths.sort();
    Ok(paths)
}

/// List `directory` once and push every match through `pipeline`, in order,
/// before returning.
pub async fn scan_once(
    directory: &Path,
    extension: &str,
    pipeline: &ClaimPipeline,
) -> Result<BacklogSummary> {
    let paths = list_matching(directory, extension).await?;
    let mut summary = BacklogSummary {
        discovered: paths.len(),
        ..BacklogSummary::default()
    };

    for path in &paths {
        match pipeline.handle(path).await {
            FileOutcome::Done(_) => summary.outcomes.done += 1,
            FileOutcome::Failed(_) => summary.outcomes.failed += 1,
            FileOutcome::AlreadyClaimed => summary.outcomes.already_claimed += 1,
            FileOutcome::ClaimFailed(_) => summary.outcomes.claim_failed += 1,
            FileOutcome::Ignored => summary.outcomes.ignored += 1,
        }
    }

    info!(
        directory = %directory.display(),
        discovered = summary.discovered,
        processed = summary.outcomes.done,
        already_claimed = summary.outcomes.already_claimed,
        "backlog scan complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tempfile::tempdir;

    use super::*;
    use crate::claim::MarkerClaimStore;
    use crate::processor::{FileProcessor, WorkSimulator};
    use crate::report::{RecordingSink, Reporter};

    struct InstantWork;

    #[async_trait]
    impl WorkSimulator for InstantWork {
        async fn perform(&self, _duration: f64) {}
    }

    async fn pipeline(lock_dir: &Path) -> ClaimPipeline {
        let store = MarkerClaimStore::open(lock_dir).await.unwrap();
        let reporter = Reporter::new(NonZeroU64::new(5).unwrap(), Arc::new(RecordingSink::new()));
        ClaimPipeline::new(
            Arc::new(store),
            Arc::new(FileProcessor::new(Arc::new(InstantWork), reporter)),
        )
    }

    #[test]
    fn pattern_requires_exact_extension() {
        assert!(matches_pattern(Path::new("/in/a.txt"), "txt"));
        assert!(!matches_pattern(Path::new("/in/a.txt.tmp"), "txt"));
        assert!(!matches_pattern(Path::new("/in/a.TXT"), "txt"));
        assert!(!matches_pattern(Path::new("/in/.hidden.txt"), "txt"));
        assert!(!matches_pattern(Path::new("/in/txt"), "txt"));
    }

    #[tokio::test]
    async fn lists_only_matching_regular_files() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("b.txt"), "1").unwrap();
        std::fs::write(dir.join("a.txt"), "1").unwrap();
        std::fs::write(dir.join("notes.md"), "1").unwrap();
        std::fs::create_dir(dir.join("folder.txt")).unwrap();
        std::fs::create_dir(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested").join("c.txt"), "1").unwrap();

        let listed = list_matching(dir, "txt").await.unwrap();
        assert_eq!(listed, vec![dir.join("a.txt"), dir.join("b.txt")]);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let tmp = tempdir().unwrap();
        let pipeline = pipeline(&tmp.path().join("locks")).await;
        assert!(
            scan_once(&tmp.path().join("absent"), "txt", &pipeline)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn scan_processes_each_file_and_rerun_processes_none() {
        let tmp = tempdir().unwrap();
        let incoming = tmp.path().join("incoming");
        let locks = tmp.path().join("locks");
        std::fs::create_dir(&incoming).unwrap();
        std::fs::write(incoming.join("1.txt"), "1").unwrap();
        std::fs::write(incoming.join("2.txt"), "2").unwrap();
        std::fs::write(incoming.join("3.txt"), "oops").unwrap();

        let first = scan_once(&incoming, "txt", &pipeline(&locks).await)
            .await
            .unwrap();
        assert_eq!(first.discovered, 3);
        assert_eq!(first.outcomes.done, 2);
        assert_eq!(first.outcomes.failed, 1);

        let second = scan_once(&incoming, "txt", &pipeline(&locks).await)
            .await
            .unwrap();
        assert_eq!(second.discovered, 3);
        assert_eq!(second.outcomes.done, 0);
        assert_eq!(second.outcomes.already_claimed, 3);
    }
}
