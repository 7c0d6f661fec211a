//! Rate-limited aggregate reporting.

use std::fmt;
use std::io::{self, Write};
use std::num::NonZeroU64;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

/// One aggregate line emitted every `interval` processed files.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReportSummary {
    /// Files processed so far by this reporter.
    pub files_processed: u64,
    /// Sum of every duration passed to the reporter.
    pub total_duration: f64,
    /// Statistic value supplied with the call that triggered the report.
    pub sum_of_squares: f64,
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Files processed: {}, Total Time: {}, Sum of Squares: {}",
            self.files_processed,
            Decimal(self.total_duration),
            Decimal(self.sum_of_squares)
        )
    }
}

/// Shortest round-trip form, but integral values keep one decimal place
/// (`7.0`, not `7`) so the field always reads as a real number.
struct Decimal(f64);

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() && self.0.fract() == 0.0 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Destination for aggregate reports. Swapping the sink never touches the
/// accounting in [`Reporter`].
pub trait ReportSink: Send + Sync {
    fn emit(&self, summary: &ReportSummary);
}

/// Writes each summary as one text line.
pub struct TextSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl TextSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }
}

impl ReportSink for TextSink {
    fn emit(&self, summary: &ReportSummary) {
        let mut out = self.out.lock();
        if let Err(err) = writeln!(out, "{summary}").and_then(|_| out.flush()) {
            warn!(error = %err, "failed to write report line");
        }
    }
}

impl fmt::Debug for TextSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TextSink")
    }
}

/// Routes summaries into the `tracing` pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, summary: &ReportSummary) {
        info!(
            target: "claimwatch::report",
            files_processed = summary.files_processed,
            total_duration = summary.total_duration,
            sum_of_squares = summary.sum_of_squares,
            "{summary}"
        );
    }
}

/// Keeps every emitted summary in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    summaries: Mutex<Vec<ReportSummary>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summaries(&self) -> Vec<ReportSummary> {
        self.summaries.lock().clone()
    }
}

impl ReportSink for RecordingSink {
    fn emit(&self, summary: &ReportSummary) {
        self.summaries.lock().push(*summary);
    }
}

/// Counts calls and accumulates durations, emitting a summary on every
/// `interval`-th call and on no other.
pub struct Reporter {
    interval: NonZeroU64,
    calls: u64,
    total_duration: f64,
    sink: Arc<dyn ReportSink>,
}

impl Reporter {
    pub fn new(interval: NonZeroU64, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            interval,
            calls: 0,
            total_duration: 0.0,
            sink,
        }
    }

    /// Record one processed file. Returns the summary if this call emitted one.
    pub fn report(&mut self, duration: f64, sum_of_squares: f64) -> Option<ReportSummary> {
        self.calls += 1;
        self.total_duration += duration;

        if self.calls % self.interval.get() != 0 {
            return None;
        }

        let summary = ReportSummary {
            files_processed: self.calls,
            total_duration: self.total_duration,
            sum_of_squares,
        };
        self.sink.emit(&summary);
        Some(summary)
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("interval", &self.interval)
            .field("calls", &self.calls)
            .field("total_duration", &self.total_duration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    #[test]
    fn emits_only_on_multiples_of_interval() {
        let sink = Arc::new(RecordingSink::new());
        let mut reporter = Reporter::new(interval(5), sink.clone());

        let mut emitted_at = Vec::new();
        for call in 1..=17u64 {
            if reporter.report(call as f64, 0.0).is_some() {
                emitted_at.push(call);
            }
        }

        assert_eq!(emitted_at, vec![5, 10, 15]);
        assert_eq!(sink.summaries().len(), 3);
    }

    #[test]
    fn cumulative_duration_covers_all_prior_calls() {
        let sink = Arc::new(RecordingSink::new());
        let mut reporter = Reporter::new(interval(5), sink.clone());

        let durations = [1.0, 2.5, 0.5, 4.0, 2.0, 1.0, 1.0, 1.0, 1.0, 6.0];
        for (i, d) in durations.iter().enumerate() {
            reporter.report(*d, i as f64);
        }

        let summaries = sink.summaries();
        assert_eq!(
            summaries,
            vec![
                ReportSummary {
                    files_processed: 5,
                    total_duration: 10.0,
                    sum_of_squares: 4.0,
                },
                ReportSummary {
                    files_processed: 10,
                    total_duration: 20.0,
                    sum_of_squares: 9.0,
                },
            ]
        );
        assert_eq!(reporter.calls(), 10);
        assert_eq!(reporter.total_duration(), 20.0);
    }

    #[test]
    fn interval_of_one_reports_every_call() {
        let sink = Arc::new(RecordingSink::new());
        let mut reporter = Reporter::new(interval(1), sink.clone());
        reporter.report(1.0, 0.0);
        reporter.report(1.0, 0.0);
        assert_eq!(sink.summaries().len(), 2);
    }

    #[test]
    fn text_line_keeps_a_decimal_place_on_every_real_field() {
        let summary = ReportSummary {
            files_processed: 5,
            total_duration: 12.5,
            sum_of_squares: 3.0,
        };
        assert_eq!(
            summary.to_string(),
            "Files processed: 5, Total Time: 12.5, Sum of Squares: 3.0"
        );

        let first = ReportSummary {
            files_processed: 1,
            total_duration: 0.1 + 0.2,
            sum_of_squares: 0.0,
        };
        assert_eq!(
            first.to_string(),
            "Files processed: 1, Total Time: 0.30000000000000004, Sum of Squares: 0.0"
        );
    }

    #[test]
    fn text_sink_writes_one_line_per_summary() {
        #[derive(Clone, Default)]
        struct Shared(Arc<Mutex<Vec<u8>>>);

        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let buffer = Shared::default();
        let sink = TextSink::new(Box::new(buffer.clone()));
        let summary = ReportSummary {
            files_processed: 10,
            total_duration: 7.0,
            sum_of_squares: 1.5,
        };
        sink.emit(&summary);
        sink.emit(&summary);

        let text = String::from_utf8(buffer.0.lock().clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("Files processed: 10, Total Time: 7.0, Sum of Squares: 1.5\n"));
    }
}
