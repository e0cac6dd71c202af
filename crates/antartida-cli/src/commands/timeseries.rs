use antartida_core::{Aggregation, AggregationPeriod, WeatherDataFetcher, WeatherPoint};
use serde::Serialize;
use serde_json::Value;

use crate::cli::TimeseriesArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct TimeseriesResponseData<'a> {
    station: &'a str,
    aggregation: Aggregation,
    period: Option<AggregationPeriod>,
    count: usize,
    points: Vec<WeatherPoint>,
}

pub async fn run(
    args: &TimeseriesArgs,
    fetcher: &dyn WeatherDataFetcher,
) -> Result<Value, CliError> {
    let series = fetcher
        .timeseries(args.from, args.to, &args.station)
        .await?
        .dedup_by_timestamp()
        .between(args.from, args.to);
    tracing::debug!(points = series.len(), "series ready for aggregation");

    let points = args
        .aggregation
        .aggregate(series.points(), args.period.duration())?;

    Ok(serde_json::to_value(TimeseriesResponseData {
        station: &args.station,
        aggregation: args.aggregation,
        period: (args.aggregation != Aggregation::Identity).then_some(args.period),
        count: points.len(),
        points,
    })?)
}
