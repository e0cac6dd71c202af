//! CLI argument definitions for antartida.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `stations` | List known stations |
//! | `range` | Validity range of one station |
//! | `timeseries` | Fetch, filter and optionally aggregate a station series |
//!
//! Settings come from the environment (`AEMET_API_KEY`, `ANTARTIDA_*`). Global flags
//! override them for one invocation.
//!
//! ```bash
//! antartida stations --pretty
//! antartida timeseries "Meteo Station Juan Carlos I" \
//!     --from 2023-01-01T00:00:00Z --to 2023-03-01T00:00:00Z \
//!     --aggregation mean --period daily
//! ```

use std::num::NonZeroUsize;
use std::path::PathBuf;

use antartida_core::{
    Aggregation, AggregationPeriod, CacheMode, FetcherKind, MemoMode, UtcDateTime,
    ValidationError, WindowMode,
};
use clap::{Args, Parser, Subcommand};

/// Antarctic station weather series from the AEMET open data provider.
#[derive(Debug, Parser)]
#[command(name = "antartida", author, version, about)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Serve synthetic 10-minute data instead of calling the provider.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// Retrieval strategy: serial, concurrent or naive.
    #[arg(long, global = true)]
    pub fetcher: Option<FetcherKind>,

    /// Process memo of window fetches: memory or none.
    #[arg(long, global = true)]
    pub memo: Option<MemoMode>,

    /// Persistent cache: none or duckdb.
    #[arg(long, global = true)]
    pub cache: Option<CacheMode>,

    /// Window boundaries: month or fixed.
    #[arg(long, global = true)]
    pub windows: Option<WindowMode>,

    /// Concurrent requests per chunk.
    #[arg(long, global = true)]
    pub max_concurrent: Option<NonZeroUsize>,

    /// Abort a fetch after this many seconds.
    #[arg(long, global = true)]
    pub deadline_secs: Option<u64>,

    /// Data root for the persistent cache.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Station catalog JSON file.
    #[arg(long, global = true)]
    pub stations_json: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List known station names.
    Stations,

    /// Show the validity range of a station.
    Range(RangeArgs),

    /// Fetch a station series between two dates.
    ///
    /// Points are de-duplicated by timestamp and limited to `[from, to)` before any
    /// aggregation.
    Timeseries(TimeseriesArgs),
}

#[derive(Debug, Args)]
pub struct RangeArgs {
    /// Station name as listed by `stations`.
    pub station: String,
}

#[derive(Debug, Args)]
pub struct TimeseriesArgs {
    /// Station name as listed by `stations`.
    pub station: String,

    /// Start date (RFC3339, or a date interpreted as UTC midnight).
    #[arg(long, value_parser = parse_timestamp)]
    pub from: UtcDateTime,

    /// End date (RFC3339, or a date interpreted as UTC midnight).
    #[arg(long, value_parser = parse_timestamp)]
    pub to: UtcDateTime,

    /// Reducer: identity, first, last, mean or median.
    #[arg(long, default_value = "identity")]
    pub aggregation: Aggregation,

    /// Period: hourly, daily or monthly.
    #[arg(long, default_value = "hourly")]
    pub period: AggregationPeriod,
}

fn parse_timestamp(value: &str) -> Result<UtcDateTime, ValidationError> {
    UtcDateTime::parse_lenient(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeseries_arguments_parse_with_defaults() {
        let cli = Cli::try_parse_from([
            "antartida",
            "timeseries",
            "Meteo Station Juan Carlos I",
            "--from",
            "2023-01-01",
            "--to",
            "2023-02-01T00:00:00Z",
        ])
        .expect("parse");

        let Command::Timeseries(args) = cli.command else {
            panic!("expected timeseries");
        };
        assert_eq!(args.station, "Meteo Station Juan Carlos I");
        assert_eq!(args.from.format_rfc3339(), "2023-01-01T00:00:00Z");
        assert_eq!(args.aggregation, Aggregation::Identity);
        assert_eq!(args.period, AggregationPeriod::Hourly);
    }

    #[test]
    fn global_overrides_parse_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "antartida",
            "stations",
            "--fetcher",
            "concurrent",
            "--max-concurrent",
            "2",
            "--cache",
            "duckdb",
        ])
        .expect("parse");

        assert_eq!(cli.fetcher, Some(FetcherKind::Concurrent));
        assert_eq!(cli.max_concurrent.map(NonZeroUsize::get), Some(2));
        assert_eq!(cli.cache, Some(CacheMode::DuckDb));
    }

    #[test]
    fn unknown_aggregation_is_rejected() {
        let result = Cli::try_parse_from([
            "antartida",
            "timeseries",
            "x",
            "--from",
            "2023-01-01",
            "--to",
            "2023-01-02",
            "--aggregation",
            "max",
        ]);

        assert!(result.is_err());
    }
}
