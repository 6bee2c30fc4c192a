use chrono::{DateTime, Duration, Utc};

use crate::model::models::{Forecast, Temperature};

/**
 * Length of the trailing forecast window.
 */
const FORECAST_WINDOW_HOURS: i64 = 24;

/**
 * Interval of reading timestamps, in seconds since epoch, that a forecast is computed over.
 * Both ends are inclusive.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastWindow {
    pub start: i64,
    pub end: i64,
}

impl ForecastWindow {
    /**
     * The 24 hours up to and including `now`.
     */
    pub fn trailing_day(now: DateTime<Utc>) -> Self {
        let start = now - Duration::hours(FORECAST_WINDOW_HOURS);
        ForecastWindow { start: start.timestamp(), end: now.timestamp() }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /**
     * Averages max and min of the readings of `city_id` inside the window.
     * Readings of other cities and outside the window are ignored.
     */
    #[allow(clippy::cast_precision_loss)]
    pub fn aggregate<'a>(&self, city_id: i64, readings: impl IntoIterator<Item = &'a Temperature>) -> Forecast {
        let (sum_max, sum_min, sample) = readings
            .into_iter()
            .filter(|reading| reading.city_id == city_id && self.contains(reading.timestamp))
            .fold((0i64, 0i64, 0i64), |(sum_max, sum_min, sample), reading| (sum_max + i64::from(reading.max), sum_min + i64::from(reading.min), sample + 1));
        if sample == 0 {
            return Forecast::empty(city_id);
        }
        Forecast::new(city_id, sum_max as f64 / sample as f64, sum_min as f64 / sample as f64, sample)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_trailing_day_bounds() {
        let window = ForecastWindow::trailing_day(now());
        assert_eq!(window.end, 1_700_000_000);
        assert_eq!(window.end - window.start, 86_400);
        assert!(window.contains(window.start));
        assert!(window.contains(window.end));
        assert!(!window.contains(window.start - 1));
        assert!(!window.contains(window.end + 1));
    }

    #[test]
    fn test_aggregate_excludes_readings_outside_window() {
        let now = now();
        let window = ForecastWindow::trailing_day(now);
        let hour = 3600;
        let readings = vec![
            Temperature::new(1, 7, 10, 5, now.timestamp() - hour),
            Temperature::new(2, 7, 11, 8, now.timestamp() - 23 * hour),
            Temperature::new(3, 7, 110, 60, now.timestamp() - 25 * hour),
            Temperature::new(4, 8, 40, 30, now.timestamp() - hour),
        ];
        let forecast = window.aggregate(7, &readings);
        assert_eq!(forecast, Forecast::new(7, 10.5, 6.5, 2));
    }

    #[test]
    fn test_aggregate_without_readings() {
        let window = ForecastWindow::trailing_day(now());
        let forecast = window.aggregate(7, &[]);
        assert_eq!(forecast, Forecast::empty(7));
        assert_eq!(forecast.sample, 0);
        assert_eq!(forecast.max, 0.0);
        assert_eq!(forecast.min, 0.0);
    }
}
