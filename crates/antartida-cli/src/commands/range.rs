use antartida_core::{UtcDateTime, WeatherDataFetcher};
use serde::Serialize;
use serde_json::Value;

use crate::cli::RangeArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct RangeResponseData<'a> {
    station: &'a str,
    valid_from: UtcDateTime,
    valid_to: UtcDateTime,
}

pub async fn run(args: &RangeArgs, fetcher: &dyn WeatherDataFetcher) -> Result<Value, CliError> {
    let (valid_from, valid_to) = fetcher.time_range(&args.station).await?;
    Ok(serde_json::to_value(RangeResponseData {
        station: &args.station,
        valid_from,
        valid_to,
    })?)
}
