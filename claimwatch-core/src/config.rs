use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};

/// Directory name used for claim markers when nothing else is configured.
pub const DEFAULT_LOCK_DIR: &str = ".UCWorkerDFLocks";

/// Where periodic aggregate reports are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSinkKind {
    /// Plain text lines on stdout.
    #[default]
    Text,
    /// `tracing` events under the `claimwatch::report` target.
    Tracing,
}

/// Global knobs for one worker instance.
///
/// All fields carry defaults so a partial TOML/JSON payload (or none at all)
/// yields a usable configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Marker directory. Created at startup if absent; never cleaned.
    pub lock_dir: PathBuf,
    /// Extension (without the dot) of files the worker picks up.
    pub extension: String,
    /// Emit one aggregate report every `report_interval` processed files.
    pub report_interval: u64,
    /// Wall-clock seconds consumed per declared duration unit.
    pub seconds_per_unit: f64,
    /// Hold an in-process gate across claim+process so local work runs one
    /// file at a time. Dedup does not depend on this.
    pub serialize_processing: bool,
    /// Write a secondary `<id>.done` marker after successful processing.
    pub record_completions: bool,
    /// Report destination.
    pub report_sink: ReportSinkKind,
    /// Capacity of the channel bridging notify callbacks into the runtime.
    pub watch_channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            lock_dir: PathBuf::from(DEFAULT_LOCK_DIR),
            extension: "txt".to_string(),
            report_interval: 5,
            seconds_per_unit: 60.0,
            serialize_processing: true,
            record_completions: false,
            report_sink: ReportSinkKind::Text,
            watch_channel_capacity: 1024,
        }
    }
}

impl WorkerConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.report_interval == 0 {
            return Err(WorkerError::Config(
                "report_interval must be at least 1".into(),
            ));
        }
        if !self.seconds_per_unit.is_finite() || self.seconds_per_unit < 0.0 {
            return Err(WorkerError::Config(format!(
                "seconds_per_unit must be a finite, non-negative number (got {})",
                self.seconds_per_unit
            )));
        }
        if self.normalized_extension().is_empty() {
            return Err(WorkerError::Config("extension must not be empty".into()));
        }
        if self.watch_channel_capacity == 0 {
            return Err(WorkerError::Config(
                "watch_channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Extension with any leading dot removed, so `.txt` and `txt` agree.
    pub fn normalized_extension(&self) -> &str {
        self.extension.trim().trim_start_matches('.')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_out_of_the_box() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.lock_dir, PathBuf::from(".UCWorkerDFLocks"));
        assert_eq!(cfg.extension, "txt");
        assert_eq!(cfg.report_interval, 5);
        assert_eq!(cfg.seconds_per_unit, 60.0);
        assert!(cfg.serialize_processing);
        assert!(!cfg.record_completions);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: WorkerConfig = toml::from_str(
            r#"
            seconds_per_unit = 0.001
            report_sink = "tracing"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.seconds_per_unit, 0.001);
        assert_eq!(cfg.report_sink, ReportSinkKind::Tracing);
        assert_eq!(cfg.report_interval, 5);
        assert_eq!(cfg.extension, "txt");
    }

    #[test]
    fn json_payload_is_accepted() {
        let cfg: WorkerConfig =
            serde_json::from_str(r#"{"extension": ".dat", "report_interval": 2}"#).unwrap();
        assert_eq!(cfg.normalized_extension(), "dat");
        assert_eq!(cfg.report_interval, 2);
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let zero_interval = WorkerConfig {
            report_interval: 0,
            ..WorkerConfig::default()
        };
        assert!(matches!(zero_interval.validate(), Err(WorkerError::Config(_))));

        let negative_scale = WorkerConfig {
            seconds_per_unit: -1.0,
            ..WorkerConfig::default()
        };
        assert!(negative_scale.validate().is_err());

        let nan_scale = WorkerConfig {
            seconds_per_unit: f64::NAN,
            ..WorkerConfig::default()
        };
        assert!(nan_scale.validate().is_err());

        let no_extension = WorkerConfig {
            extension: " . ".into(),
            ..WorkerConfig::default()
        };
        assert!(no_extension.validate().is_err());
    }
}
