use antartida_core::WeatherDataFetcher;
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StationsResponseData {
    stations: Vec<String>,
}

pub async fn run(fetcher: &dyn WeatherDataFetcher) -> Result<Value, CliError> {
    let stations = fetcher.stations().await?;
    Ok(serde_json::to_value(StationsResponseData { stations })?)
}
