//! Reads a file's declared duration, performs the (simulated) work, and
//! feeds the statistics accumulator and reporter.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::report::{ReportSummary, Reporter};
use crate::stats::RollingSquaredDifferences;

/// Why a claimed file produced no statistic.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// First line missing or not a finite, non-negative number.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The file vanished or could not be read.
    #[error("read failure: {0}")]
    ReadFailure(#[from] io::Error),
}

/// The unit of work performed for each file. The default sleeps; a real
/// implementation can substitute genuine processing without touching the
/// claim or statistics logic.
#[async_trait]
pub trait WorkSimulator: Send + Sync {
    /// Consume `duration` declared units and return.
    async fn perform(&self, duration: f64);
}

/// Sleeps `duration × seconds_per_unit` seconds of wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct SleepWork {
    seconds_per_unit: f64,
}

impl SleepWork {
    pub fn new(seconds_per_unit: f64) -> Self {
        Self { seconds_per_unit }
    }

    pub fn delay_for(&self, duration: f64) -> Duration {
        Duration::try_from_secs_f64(duration * self.seconds_per_unit).unwrap_or(Duration::MAX)
    }
}

#[async_trait]
impl WorkSimulator for SleepWork {
    async fn perform(&self, duration: f64) {
        tokio::time::sleep(self.delay_for(duration)).await;
    }
}

/// Successful processing of one file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Processed {
    /// Declared duration read from the file.
    pub duration: f64,
    /// Statistic returned by the accumulator for this file.
    pub sum_of_squares: f64,
    /// Summary emitted by the reporter, if this file hit the interval.
    pub report: Option<ReportSummary>,
}

/// Point-in-time view of the process-wide counters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TallySnapshot {
    pub files_processed: u64,
    pub total_duration: f64,
}

struct Tally {
    stats: RollingSquaredDifferences,
    reporter: Reporter,
}

/// Processes claimed files. Statistics and reporting are serialised
/// through one lock so concurrent callers never interleave an update.
pub struct FileProcessor {
    work: Arc<dyn WorkSimulator>,
    tally: Mutex<Tally>,
}

impl FileProcessor {
    pub fn new(work: Arc<dyn WorkSimulator>, reporter: Reporter) -> Self {
        Self {
            work,
            tally: Mutex::new(Tally {
                stats: RollingSquaredDifferences::new(),
                reporter,
            }),
        }
    }

    /// Read the declared duration, perform the work, then update the
    /// accumulator and the reporter, in that order.
    pub async fn process(&self, path: &Path) -> Result<Processed, ProcessError> {
        let line = read_first_line(path).await?;
        let duration = parse_duration(&line)?;

        self.work.perform(duration).await;

        let mut tally = self.tally.lock();
        let sum_of_squares = tally.stats.update(duration);
        let report = tally.reporter.report(duration, sum_of_squares);
        Ok(Processed {
            duration,
            sum_of_squares,
            report,
        })
    }

    pub fn snapshot(&self) -> TallySnapshot {
        let tally = self.tally.lock();
        TallySnapshot {
            files_processed: tally.reporter.calls(),
            total_duration: tally.reporter.total_duration(),
        }
    }
}

impl fmt::Debug for FileProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tally = self.tally.lock();
        f.debug_struct("FileProcessor")
            .field("stats", &tally.stats)
            .field("reporter", &tally.reporter)
            .finish()
    }
}

async fn read_first_line(path: &Path) -> io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(line)
}

/// Parse a declared duration from the first line of a data file.
pub fn parse_duration(line: &str) -> Result<f64, ProcessError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ProcessError::MalformedInput("empty first line".into()));
    }

    let value: f64 = trimmed
        .parse()
        .map_err(|_| ProcessError::MalformedInput(format!("not a number: {trimmed:?}")))?;

    if !value.is_finite() || value < 0.0 {
        return Err(ProcessError::MalformedInput(format!(
            "duration must be finite and non-negative: {trimmed:?}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use tempfile::tempdir;

    use super::*;
    use crate::report::RecordingSink;

    #[derive(Debug, Default)]
    struct CountingWork {
        seen: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl WorkSimulator for CountingWork {
        async fn perform(&self, duration: f64) {
            self.seen.lock().push(duration);
        }
    }

    fn processor(interval: u64) -> (FileProcessor, Arc<CountingWork>, Arc<RecordingSink>) {
        let work = Arc::new(CountingWork::default());
        let sink = Arc::new(RecordingSink::new());
        let reporter = Reporter::new(NonZeroU64::new(interval).unwrap(), sink.clone());
        (FileProcessor::new(work.clone(), reporter), work, sink)
    }

    #[test]
    fn parses_first_line_values() {
        assert_eq!(parse_duration("3\n").unwrap(), 3.0);
        assert_eq!(parse_duration("  0.25  ").unwrap(), 0.25);
        assert_eq!(parse_duration("0").unwrap(), 0.0);
        assert_eq!(parse_duration("1e1").unwrap(), 10.0);
    }

    #[test]
    fn rejects_malformed_values() {
        for bad in ["", "\n", "abc", "1.2.3", "-1", "NaN", "inf"] {
            assert!(
                matches!(parse_duration(bad), Err(ProcessError::MalformedInput(_))),
                "{bad:?} should be malformed"
            );
        }
    }

    #[test]
    fn sleep_work_scales_duration() {
        let work = SleepWork::new(0.001);
        assert_eq!(work.delay_for(2.0), Duration::from_secs_f64(0.002));
        assert_eq!(SleepWork::new(60.0).delay_for(1.5), Duration::from_secs(90));
        assert_eq!(SleepWork::new(f64::MAX).delay_for(10.0), Duration::MAX);
    }

    #[tokio::test]
    async fn processes_only_the_first_line() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("job.txt");
        std::fs::write(&path, "2.5\n99\nignored text\n").unwrap();

        let (processor, work, _sink) = processor(5);
        let processed = processor.process(&path).await.unwrap();

        assert_eq!(processed.duration, 2.5);
        assert_eq!(processed.sum_of_squares, 0.0);
        assert_eq!(processed.report, None);
        assert_eq!(*work.seen.lock(), vec![2.5]);
    }

    #[tokio::test]
    async fn feeds_statistics_then_reporter() {
        let tmp = tempdir().unwrap();
        let (processor, _work, sink) = processor(3);

        let mut results = Vec::new();
        for (i, value) in ["1", "2", "3"].iter().enumerate() {
            let path = tmp.path().join(format!("{i}.txt"));
            std::fs::write(&path, value).unwrap();
            results.push(processor.process(&path).await.unwrap());
        }

        let stats: Vec<f64> = results.iter().map(|r| r.sum_of_squares).collect();
        assert_eq!(stats, vec![0.0, 1.0, 5.0]);

        let summaries = sink.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].files_processed, 3);
        assert_eq!(summaries[0].total_duration, 6.0);
        assert_eq!(summaries[0].sum_of_squares, 5.0);
        assert_eq!(results[2].report, Some(summaries[0]));
    }

    #[tokio::test]
    async fn malformed_file_leaves_tally_untouched() {
        let tmp = tempdir().unwrap();
        let good = tmp.path().join("good.txt");
        let bad = tmp.path().join("bad.txt");
        std::fs::write(&good, "4").unwrap();
        std::fs::write(&bad, "four\n").unwrap();

        let (processor, work, _sink) = processor(1);
        processor.process(&good).await.unwrap();
        let before = processor.snapshot();

        let err = processor.process(&bad).await.unwrap_err();
        assert!(matches!(err, ProcessError::MalformedInput(_)));
        assert_eq!(processor.snapshot(), before);
        assert_eq!(work.seen.lock().len(), 1);

        let next = processor.process(&good).await.unwrap();
        assert_eq!(next.duration, 4.0);
        assert_eq!(processor.snapshot().files_processed, 2);
    }

    #[tokio::test]
    async fn missing_file_is_read_failure() {
        let tmp = tempdir().unwrap();
        let (processor, _work, _sink) = processor(1);
        let err = processor
            .process(&tmp.path().join("vanished.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::ReadFailure(_)));
        assert_eq!(processor.snapshot().files_processed, 0);
    }

    #[tokio::test]
    async fn invalid_utf8_is_read_failure() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("binary.txt");
        std::fs::write(&path, [0xff, 0xfe, b'\n']).unwrap();
        let (processor, _work, _sink) = processor(1);
        assert!(matches!(
            processor.process(&path).await,
            Err(ProcessError::ReadFailure(_))
        ));
    }
}
