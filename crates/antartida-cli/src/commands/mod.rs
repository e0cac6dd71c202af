mod range;
mod stations;
mod timeseries;

use std::sync::Arc;

use antartida_core::http_client::{ScriptedHttpClient, SharedSessionFactory};
use antartida_core::mock::regular_series;
use antartida_core::{FetcherConfig, InMemoryTwoStep, WeatherDataFetcher};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Sampling step of the synthetic series served with `--mock`.
const MOCK_STEP: time::Duration = time::Duration::minutes(10);

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let config = resolve_config(cli)?;
    let fetcher = build_fetcher(&config, cli.mock)?;

    match &cli.command {
        Command::Stations => stations::run(fetcher.as_ref()).await,
        Command::Range(args) => range::run(args, fetcher.as_ref()).await,
        Command::Timeseries(args) => timeseries::run(args, fetcher.as_ref()).await,
    }
}

/// Environment settings with the command-line overrides applied.
fn resolve_config(cli: &Cli) -> Result<FetcherConfig, CliError> {
    let mut config = FetcherConfig::from_env()?;
    if let Some(fetcher) = cli.fetcher {
        config.fetcher = fetcher;
    }
    if let Some(memo) = cli.memo {
        config.memo = memo;
    }
    if let Some(cache) = cli.cache {
        config.cache = cache;
    }
    if let Some(windows) = cli.windows {
        config.windows = windows;
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        config.max_concurrent = max_concurrent;
    }
    if let Some(secs) = cli.deadline_secs {
        config.deadline = Some(std::time::Duration::from_secs(secs));
    }
    if let Some(home) = &cli.home {
        config.antartida_home = Some(home.clone());
    }
    if let Some(path) = &cli.stations_json {
        config.stations_json = Some(path.clone());
    }
    Ok(config)
}

fn build_fetcher(
    config: &FetcherConfig,
    mock: bool,
) -> Result<Box<dyn WeatherDataFetcher>, CliError> {
    if !mock {
        return Ok(config.build()?);
    }

    let catalog = config.catalog()?;
    let span = catalog
        .iter()
        .map(|(_, metadata)| (metadata.valid_from, metadata.valid_to))
        .reduce(|(from, to), (next_from, next_to)| (from.min(next_from), to.max(next_to)));
    let points = span
        .map(|(from, to)| {
            let end = to.checked_add(MOCK_STEP).unwrap_or(to);
            regular_series(from, end, MOCK_STEP)
        })
        .unwrap_or_default();
    tracing::info!(points = points.len(), "serving synthetic series");

    let sessions = Arc::new(SharedSessionFactory::new(Arc::new(ScriptedHttpClient::new())));
    Ok(config.build_with_protocol(InMemoryTwoStep::new(points), sessions)?)
}
