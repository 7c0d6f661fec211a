use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use claimwatch_core::ReportSinkKind;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "claimwatch", version)]
#[command(
    about = "Watch a directory and process each arriving data file exactly once"
)]
pub struct Cli {
    /// Directory where incoming data files land
    pub directory: PathBuf,

    /// Wall-clock seconds per declared duration unit (60 = real minutes)
    #[arg(long, visible_alias = "scale", env = "CLAIMWATCH_SECONDS_PER_UNIT")]
    pub seconds_per_unit: Option<f64>,

    /// Directory holding claim markers (overrides config)
    #[arg(long, env = "CLAIMWATCH_LOCK_DIR")]
    pub lock_dir: Option<PathBuf>,

    /// Extension of files to pick up, without the dot
    #[arg(long, env = "CLAIMWATCH_EXTENSION")]
    pub extension: Option<String>,

    /// Emit an aggregate report every N processed files
    #[arg(long, env = "CLAIMWATCH_REPORT_INTERVAL")]
    pub report_interval: Option<u64>,

    /// Where aggregate reports go
    #[arg(long, value_enum, env = "CLAIMWATCH_REPORT_SINK")]
    pub report_sink: Option<SinkArg>,

    /// TOML or JSON config file
    #[arg(long, env = "CLAIMWATCH_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Process the existing backlog, then exit without watching
    #[arg(long, default_value_t = false)]
    pub no_watch: bool,

    /// Write `<file>.done` markers after successful processing
    #[arg(long, env = "CLAIMWATCH_RECORD_COMPLETIONS", default_value_t = false)]
    pub record_completions: bool,

    /// Let local files process concurrently instead of one at a time
    #[arg(long, env = "CLAIMWATCH_PARALLEL", default_value_t = false)]
    pub parallel: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SinkArg {
    Text,
    Tracing,
}

impl From<SinkArg> for ReportSinkKind {
    fn from(arg: SinkArg) -> Self {
        match arg {
            SinkArg::Text => ReportSinkKind::Text,
            SinkArg::Tracing => ReportSinkKind::Tracing,
        }
    }
}
