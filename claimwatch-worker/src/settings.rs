use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use claimwatch_core::WorkerConfig;

use crate::cli::Cli;

/// Where the base (pre-override) configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    /// `--config` or `$CLAIMWATCH_CONFIG_PATH`.
    Explicit(PathBuf),
    /// A well-known file in the working directory.
    File(PathBuf),
}

/// Resolve the effective configuration.
/// Evaluation order:
/// 1) defaults,
/// 2) `--config` / `$CLAIMWATCH_CONFIG_PATH`, else `claimwatch.toml` /
///    `claimwatch.json` in the working directory,
/// 3) `CLAIMWATCH_*` environment variables and CLI flags (flags win).
pub fn load(cli: &Cli) -> anyhow::Result<(WorkerConfig, ConfigSource)> {
    let (base, source) = match &cli.config {
        Some(path) => (load_from_file(path)?, ConfigSource::Explicit(path.clone())),
        None => match find_default_file() {
            Some(path) => (load_from_file(&path)?, ConfigSource::File(path)),
            None => (WorkerConfig::default(), ConfigSource::Default),
        },
    };

    let config = apply_overrides(base, cli);
    config
        .validate()
        .context("invalid worker configuration")?;
    Ok((config, source))
}

pub fn apply_overrides(mut config: WorkerConfig, cli: &Cli) -> WorkerConfig {
    if let Some(seconds) = cli.seconds_per_unit {
        config.seconds_per_unit = seconds;
    }
    if let Some(lock_dir) = &cli.lock_dir {
        config.lock_dir = lock_dir.clone();
    }
    if let Some(extension) = &cli.extension {
        config.extension = extension.clone();
    }
    if let Some(interval) = cli.report_interval {
        config.report_interval = interval;
    }
    if let Some(sink) = cli.report_sink {
        config.report_sink = sink.into();
    }
    if cli.record_completions {
        config.record_completions = true;
    }
    if cli.parallel {
        config.serialize_processing = false;
    }
    config
}

pub fn load_from_file(path: &Path) -> anyhow::Result<WorkerConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read worker config from {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)
            .with_context(|| format!("invalid worker config {}", path.display())),
        Some("toml") => toml::from_str(&contents)
            .map_err(|err| anyhow!("invalid worker config {}: {}", path.display(), err)),
        _ => parse_from_str(&contents, &path.display().to_string()),
    }
}

pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<WorkerConfig> {
    // Try TOML first, then JSON.
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            anyhow!(
                "failed to parse worker config {}: toml error: {}; json error: {}",
                origin,
                toml_err,
                json_err
            )
        })
    })
}

fn find_default_file() -> Option<PathBuf> {
    const CANDIDATES: &[&str] = &["claimwatch.toml", "claimwatch.json"];

    CANDIDATES
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(|path| path.to_path_buf())
}
