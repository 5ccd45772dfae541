//! Trailing-window sums and period-over-period deltas for metric series.

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use insights_core::config::TrendConfig;
use insights_core::{Granularity, Period};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub period: Period,
    pub value: f64,
    pub trailing: f64,
    /// Change of `trailing` against the previous period, in percent.
    pub wow_pct: f64,
    /// Change of `trailing` against `month_lag` periods back, in percent.
    pub mom_pct: f64,
}

pub struct TrendAggregator {
    window: usize,
    month_lag: usize,
}

impl TrendAggregator {
    pub fn new(config: &TrendConfig) -> Self {
        Self {
            window: config.window.max(1),
            month_lag: config.month_lag,
        }
    }

    /// Points in period order. Deltas of periods starting on or before
    /// `cutover` are reported as 0.
    pub fn compute(&self, series: &[(Period, f64)], cutover: Option<NaiveDate>) -> Vec<TrendPoint> {
        let mut series = series.to_vec();
        series.sort_by(|a, b| a.0.cmp(&b.0));

        let trailing: Vec<f64> = (0..series.len())
            .map(|i| {
                let from = (i + 1).saturating_sub(self.window);
                series[from..=i].iter().map(|(_, v)| v).sum()
            })
            .collect();

        series
            .iter()
            .enumerate()
            .map(|(i, (period, value))| {
                let suppressed = cutover.is_some_and(|c| period.start_date() <= c);
                let delta = |lag: usize| {
                    if suppressed || lag == 0 || i < lag {
                        0.0
                    } else {
                        pct_change(trailing[i], trailing[i - lag])
                    }
                };
                TrendPoint {
                    period: *period,
                    value: *value,
                    trailing: trailing[i],
                    wow_pct: delta(1),
                    mom_pct: delta(self.month_lag),
                }
            })
            .collect()
    }
}

fn pct_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current / previous - 1.0) * 100.0
    }
}

/// Sums `(timestamp, value)` pairs into the periods they fall in. Only
/// periods with at least one value appear.
pub fn periodize<I>(values: I, granularity: Granularity, week_start: Weekday) -> Vec<(Period, f64)>
where
    I: IntoIterator<Item = (NaiveDateTime, f64)>,
{
    let mut sums: BTreeMap<Period, f64> = BTreeMap::new();
    for (ts, value) in values {
        *sums
            .entry(Period::containing(ts, granularity, week_start))
            .or_default() += value;
    }
    sums.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn monday(weeks: i64) -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-01-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
            + Duration::weeks(weeks)
    }

    fn weekly(values: &[f64]) -> Vec<(Period, f64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (Period::containing(monday(i as i64), Granularity::Week, Weekday::Mon), *v))
            .collect()
    }

    fn aggregator() -> TrendAggregator {
        TrendAggregator::new(&TrendConfig::default())
    }

    #[test]
    fn test_trailing_sums_clip_at_series_start() {
        let points = aggregator().compute(&weekly(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), None);
        let trailing: Vec<f64> = points.iter().map(|p| p.trailing).collect();
        assert_eq!(trailing, vec![1.0, 3.0, 6.0, 10.0, 14.0, 18.0]);
    }

    #[test]
    fn test_trailing_sum_matches_direct_sum_and_is_idempotent() {
        let values = [3.5, 8.25, 0.0, 12.0, 7.75, 1.5, 9.0];
        let series = weekly(&values);
        let first = aggregator().compute(&series, None);
        let second = aggregator().compute(&series, None);
        assert_eq!(first, second);
        for i in 3..values.len() {
            let direct: f64 = values[i - 3..=i].iter().sum();
            assert!((first[i].trailing - direct).abs() < 1e-12);
        }
    }

    #[test]
    fn test_deltas() {
        let points = aggregator().compute(&weekly(&[1.0, 1.0, 2.0, 0.0, 4.0]), None);
        assert_eq!(points[0].wow_pct, 0.0);
        assert!((points[1].wow_pct - 100.0).abs() < 1e-9);
        assert!((points[2].wow_pct - 100.0).abs() < 1e-9);
        assert_eq!(points[3].mom_pct, 0.0);
        // trailing[4] = 7, trailing[0] = 1
        assert!((points[4].mom_pct - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_previous_trailing_gives_zero_delta() {
        let points = aggregator().compute(&weekly(&[0.0, 5.0]), None);
        assert_eq!(points[1].wow_pct, 0.0);
    }

    #[test]
    fn test_cutover_suppresses_early_deltas() {
        let series = weekly(&[1.0, 2.0, 4.0, 8.0]);
        let cutover = series[1].0.start_date();
        let points = aggregator().compute(&series, Some(cutover));
        assert_eq!(points[1].wow_pct, 0.0);
        assert!((points[2].wow_pct - 133.33333333333334).abs() < 1e-9);
        assert_eq!(points[1].trailing, 3.0);
    }

    #[test]
    fn test_periodize_sums_into_present_periods() {
        let series = periodize(
            vec![(monday(0), 2.0), (monday(0) + Duration::days(2), 3.0), (monday(2), 1.0)],
            Granularity::Week,
            Weekday::Mon,
        );
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].1, 5.0);
        assert_eq!(series[1].0.label(), "2024-01-15/2024-01-21");
    }
}
