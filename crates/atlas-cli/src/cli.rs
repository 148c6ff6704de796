//! CLI argument definitions for atlas.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `collect` | Run a discovery pass and write the result table |
//! | `check` | Report whether the remote has data newer than the table |
//! | `watch` | Periodically check and collect when stale |
//! | `show` | Print the persisted table as JSON |
//!
//! # Global Options
//!
//! Every option falls back to its `ATLAS_*` environment variable, then to the
//! built-in default.
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--base-url` | Binance archive endpoint | Bucket listing endpoint |
//! | `--base-prefix` | `data/futures/um/daily/` | Root prefix to discover under |
//! | `--cache-path` | `cache.json` | Window cache file |
//! | `--table-path` | `binance_instruments.csv` | Result table file |
//! | `--max-workers` | `15` | Concurrent window listings |
//! | `--timeout-ms` | `10000` | Per-request timeout |
//! | `--log-level` | `info` | Log verbosity on stderr |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! atlas collect --pretty
//! atlas collect --datatype klines --refresh-cache
//! atlas check
//! atlas watch --interval-secs 60
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::Level;

/// Availability discovery for bucket-hosted market data archives.
#[derive(Debug, Parser)]
#[command(
    name = "atlas",
    author,
    version,
    about = "Discover first/last available dates per instrument in a market data archive"
)]
pub struct Cli {
    /// Bucket listing endpoint.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Root prefix to discover under; must end with '/'.
    #[arg(long, global = true)]
    pub base_prefix: Option<String>,

    /// Window cache file.
    #[arg(long, global = true)]
    pub cache_path: Option<PathBuf>,

    /// Result table file.
    #[arg(long, global = true)]
    pub table_path: Option<PathBuf>,

    /// Maximum concurrent window listings.
    #[arg(long, global = true)]
    pub max_workers: Option<usize>,

    /// Per-request timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Log verbosity written to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a discovery pass and write the result table.
    ///
    /// With --datatype only that datatype is collected and its rows replace
    /// the matching rows of the existing table.
    Collect(CollectArgs),

    /// Print {"new_data": bool} for the reference pair.
    Check,

    /// Check on an interval and collect whenever new data appears.
    Watch(WatchArgs),

    /// Print the persisted table as JSON records.
    Show(ShowArgs),
}

#[derive(Debug, Args)]
pub struct CollectArgs {
    /// Collect a single datatype instead of all of them.
    #[arg(long)]
    pub datatype: Option<String>,

    /// Re-list every pair and overwrite cached windows.
    #[arg(long, default_value_t = false)]
    pub refresh_cache: bool,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Seconds between staleness checks.
    #[arg(long, default_value_t = 60)]
    pub interval_secs: u64,

    /// Stop after this many checks.
    #[arg(long)]
    pub max_iterations: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Only print rows of this datatype.
    #[arg(long)]
    pub datatype: Option<String>,
}
