//! Behavior-driven tests for period aggregation
//!
//! These tests verify HOW fine-grained series collapse into hourly, daily and monthly
//! periods, including missing samples and incomplete trailing periods.

use antartida_core::mock::regular_series;
use antartida_core::{
    calc_mean, calc_median, sampling_interval, Aggregation, AggregationError,
    AggregationPeriod, UtcDateTime, WeatherPoint, WeatherSeries,
};
use time::Duration;

fn ts(value: &str) -> UtcDateTime {
    UtcDateTime::parse(value).expect("timestamp")
}

fn hourly(count: i64) -> Vec<WeatherPoint> {
    let start = ts("2023-01-01T00:00:00Z");
    regular_series(start, start + Duration::hours(count), Duration::HOUR)
}

// =============================================================================
// Aggregation: Chunking
// =============================================================================

#[test]
fn when_50_hourly_points_are_grouped_by_5_hours_10_points_come_out() {
    // Given: 50 hourly points
    let points = hourly(50);

    // When: They are reduced over 5-hour periods
    let output = Aggregation::Mean
        .aggregate(&points, Duration::hours(5))
        .expect("aggregate");

    // Then: Ten periods are produced
    assert_eq!(output.len(), 10);
}

#[test]
fn when_the_last_period_is_incomplete_it_is_dropped() {
    // Given: 53 hourly points
    let points = hourly(53);

    // When: They are reduced over 5-hour periods with every reducer
    for aggregation in [
        Aggregation::First,
        Aggregation::Last,
        Aggregation::Mean,
        Aggregation::Median,
    ] {
        let output = aggregation
            .aggregate(&points, Duration::hours(5))
            .expect("aggregate");

        // Then: The three trailing points do not form a period
        let expected_last = match aggregation {
            Aggregation::Last => ts("2023-01-03T01:00:00Z"),
            _ => ts("2023-01-02T21:00:00Z"),
        };
        assert_eq!(output.len(), 10, "{aggregation}");
        assert_eq!(output[9].timestamp, expected_last, "{aggregation}");
    }
}

#[test]
fn when_ten_minute_data_is_aggregated_daily_each_day_becomes_one_point() {
    // Given: Three days of 10-minute data
    let points = regular_series(
        ts("2023-01-01T00:00:00Z"),
        ts("2023-01-04T00:00:00Z"),
        Duration::minutes(10),
    );

    // When: A daily median is computed
    let output = Aggregation::Median
        .aggregate(&points, AggregationPeriod::Daily.duration())
        .expect("aggregate");

    // Then: One point per day, stamped at midnight, with the median temperature index
    assert_eq!(output.len(), 3);
    assert_eq!(output[1].timestamp, ts("2023-01-02T00:00:00Z"));
    assert_eq!(output[1].temperature, 144.0 + 71.5);
    assert_eq!(output[1].wind_speed, 0.5);
}

#[test]
fn when_input_is_out_of_order_it_is_sorted_before_chunking() {
    // Given: Hourly points in reverse order
    let mut points = hourly(4);
    points.reverse();

    // When: The first point of each 2-hour period is selected
    let output = Aggregation::First
        .aggregate(&points, Duration::hours(2))
        .expect("aggregate");

    // Then: Chunks follow time order
    let stamps: Vec<_> = output.iter().map(|p| p.timestamp).collect();
    assert_eq!(
        stamps,
        vec![ts("2023-01-01T00:00:00Z"), ts("2023-01-01T02:00:00Z")]
    );
}

// =============================================================================
// Aggregation: Missing samples
// =============================================================================

#[test]
fn when_values_are_missing_mean_and_median_ignore_them() {
    // Given: A set with one missing value
    let values = [1.0, 2.0, f64::NAN, 3.0];

    // When / Then: Both reducers see only the present values
    assert_eq!(calc_mean(&values), 2.0);
    assert_eq!(calc_median(&values), 2.0);
}

#[test]
fn when_every_value_is_missing_mean_and_median_are_zero() {
    // Given: A chunk whose temperatures are all missing
    let points: Vec<WeatherPoint> = hourly(4)
        .into_iter()
        .map(|point| WeatherPoint { temperature: f64::NAN, ..point })
        .collect();

    // When: Mean and median are computed over the whole chunk
    let mean = Aggregation::Mean
        .aggregate(&points, Duration::hours(4))
        .expect("mean");
    let median = Aggregation::Median
        .aggregate(&points, Duration::hours(4))
        .expect("median");

    // Then: The missing field reduces to zero, the others keep their statistics
    assert_eq!(mean[0].temperature, 0.0);
    assert_eq!(median[0].temperature, 0.0);
    assert_eq!(mean[0].pressure, 990.0);
    assert_eq!(calc_mean(&[f64::NAN]), 0.0);
}

// =============================================================================
// Aggregation: Invalid input
// =============================================================================

#[test]
fn when_the_period_is_shorter_than_the_sampling_interval_it_is_rejected() {
    // Given: Hourly data
    let points = hourly(10);

    // When: A 10-minute period is requested
    let error = Aggregation::Mean
        .aggregate(&points, Duration::minutes(10))
        .expect_err("must fail");

    // Then: The period is reported as invalid
    assert!(matches!(error, AggregationError::InvalidPeriod { .. }));
}

#[test]
fn when_samples_share_a_timestamp_the_interval_is_zero_and_rejected() {
    // Given: Two points at the same instant
    let at = ts("2023-01-01T00:00:00Z");
    let points = vec![
        WeatherPoint::new(at, 1.0, 1.0, 1.0),
        WeatherPoint::new(at, 2.0, 2.0, 2.0),
    ];

    // When: Any reducing aggregation runs
    let error = Aggregation::Last
        .aggregate(&points, Duration::HOUR)
        .expect_err("zero interval");

    // Then: It fails with an invalid period
    assert_eq!(
        error,
        AggregationError::InvalidPeriod {
            period_secs: 3600,
            interval_secs: 0,
        }
    );
    assert_eq!(sampling_interval(&points), Some(Duration::ZERO));
}

#[test]
fn when_there_is_nothing_to_aggregate_the_output_is_empty() {
    // Given / When: Empty input for every reducer and period
    for aggregation in Aggregation::ALL {
        for period in AggregationPeriod::ALL {
            let output = aggregation
                .aggregate(&[], period.duration())
                .expect("empty input");

            // Then: Nothing comes out
            assert!(output.is_empty());
        }
    }
}

#[test]
fn when_identity_is_requested_the_series_passes_through_unchanged() {
    // Given: A filtered series
    let series = WeatherSeries::new(hourly(48))
        .between(ts("2023-01-01T06:00:00Z"), ts("2023-01-01T18:00:00Z"));

    // When: Identity runs with a monthly period
    let output = Aggregation::Identity
        .aggregate(series.points(), AggregationPeriod::Monthly.duration())
        .expect("identity");

    // Then: The 12 points of [06:00, 18:00) come back as they were
    assert_eq!(output.len(), 12);
    assert_eq!(output.as_slice(), series.points());
}
