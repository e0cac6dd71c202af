use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::UtcDateTime;

/// One station reading. Missing samples are NaN.
///
/// Equality and ordering only look at `timestamp`, so two readings taken at the same instant
/// are the same point regardless of their values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeatherPoint {
    pub timestamp: UtcDateTime,
    pub temperature: f64,
    pub pressure: f64,
    pub wind_speed: f64,
}

impl WeatherPoint {
    pub const fn new(
        timestamp: UtcDateTime,
        temperature: f64,
        pressure: f64,
        wind_speed: f64,
    ) -> Self {
        Self {
            timestamp,
            temperature,
            pressure,
            wind_speed,
        }
    }

    /// A point whose readings are all missing.
    pub const fn missing(timestamp: UtcDateTime) -> Self {
        Self::new(timestamp, f64::NAN, f64::NAN, f64::NAN)
    }

    /// True when every reading equals `other`'s, treating NaN as equal to NaN.
    pub fn same_readings(&self, other: &Self) -> bool {
        fn same(a: f64, b: f64) -> bool {
            (a.is_nan() && b.is_nan()) || a == b
        }
        same(self.temperature, other.temperature)
            && same(self.pressure, other.pressure)
            && same(self.wind_speed, other.wind_speed)
    }
}

impl PartialEq for WeatherPoint {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}

impl Eq for WeatherPoint {}

impl PartialOrd for WeatherPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WeatherPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

/// Owned sequence of points for one station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeatherSeries {
    points: Vec<WeatherPoint>,
}

impl WeatherSeries {
    pub fn new(points: Vec<WeatherPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[WeatherPoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<WeatherPoint> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&WeatherPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&WeatherPoint> {
        self.points.last()
    }

    pub fn extend(&mut self, points: impl IntoIterator<Item = WeatherPoint>) {
        self.points.extend(points);
    }

    /// Stable sort by timestamp.
    pub fn sort(&mut self) {
        self.points.sort();
    }

    pub fn is_sorted(&self) -> bool {
        self.points.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Sort, then keep the first point seen for each timestamp.
    pub fn dedup_by_timestamp(mut self) -> Self {
        self.sort();
        self.points.dedup();
        self
    }

    /// Points with `start <= timestamp < end`, sorted.
    pub fn between(mut self, start: UtcDateTime, end: UtcDateTime) -> Self {
        self.sort();
        let from = self.points.partition_point(|point| point.timestamp < start);
        let to = self.points.partition_point(|point| point.timestamp < end);
        let to = to.max(from);
        self.points.truncate(to);
        self.points.drain(..from);
        self
    }
}

impl From<Vec<WeatherPoint>> for WeatherSeries {
    fn from(points: Vec<WeatherPoint>) -> Self {
        Self::new(points)
    }
}

impl FromIterator<WeatherPoint> for WeatherSeries {
    fn from_iter<T: IntoIterator<Item = WeatherPoint>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for WeatherSeries {
    type Item = WeatherPoint;
    type IntoIter = std::vec::IntoIter<WeatherPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn at(minutes: i64) -> UtcDateTime {
        UtcDateTime::parse("2023-01-01T00:00:00Z").expect("base") + Duration::minutes(minutes)
    }

    fn point(minutes: i64, temperature: f64) -> WeatherPoint {
        WeatherPoint::new(at(minutes), temperature, 990.0, 4.0)
    }

    #[test]
    fn equality_ignores_readings() {
        assert_eq!(point(10, 1.0), point(10, 2.0));
        assert!(!point(10, 1.0).same_readings(&point(10, 2.0)));
        assert!(WeatherPoint::missing(at(0)).same_readings(&WeatherPoint::missing(at(5))));
    }

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let series = WeatherSeries::new(vec![
            point(20, 3.0),
            point(0, 1.0),
            point(10, 2.0),
            point(10, 99.0),
            point(20, 98.0),
        ]);

        let deduped = series.dedup_by_timestamp();

        let temps: Vec<f64> = deduped.points().iter().map(|p| p.temperature).collect();
        assert_eq!(temps, vec![1.0, 2.0, 3.0]);
        assert!(deduped.is_sorted());
    }

    #[test]
    fn between_is_half_open() {
        let series: WeatherSeries = (0..6).map(|i| point(i * 10, i as f64)).collect();

        let window = series.between(at(10), at(40));

        let stamps: Vec<UtcDateTime> = window.points().iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![at(10), at(20), at(30)]);
    }

    #[test]
    fn between_with_inverted_bounds_is_empty() {
        let series: WeatherSeries = (0..6).map(|i| point(i * 10, i as f64)).collect();
        assert!(series.between(at(40), at(10)).is_empty());
    }
}
