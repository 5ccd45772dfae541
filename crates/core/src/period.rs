//! Half-open reporting periods at day, week, or month granularity.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

/// `[start, end)` interval identified by its start instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub granularity: Granularity,
}

impl Period {
    /// The period of the given granularity that contains `ts`.
    pub fn containing(ts: NaiveDateTime, granularity: Granularity, week_start: Weekday) -> Self {
        let date = ts.date();
        let (start, end) = match granularity {
            Granularity::Day => (date, date + Duration::days(1)),
            Granularity::Week => {
                let offset = (date.weekday().num_days_from_monday() + 7
                    - week_start.num_days_from_monday())
                    % 7;
                let start = date - Duration::days(offset as i64);
                (start, start + Duration::days(7))
            }
            Granularity::Month => {
                let start = first_of_month(date);
                (start, first_of_month(start + Duration::days(32)))
            }
        };
        Self {
            start: start.and_time(NaiveTime::MIN),
            end: end.and_time(NaiveTime::MIN),
            granularity,
        }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts < self.end
    }

    /// The period immediately after this one.
    pub fn next(&self, week_start: Weekday) -> Self {
        Self::containing(self.end, self.granularity, week_start)
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn label(&self) -> String {
        match self.granularity {
            Granularity::Day => self.start.format("%Y-%m-%d").to_string(),
            Granularity::Week => format!(
                "{}/{}",
                self.start.format("%Y-%m-%d"),
                (self.end - Duration::days(1)).format("%Y-%m-%d")
            ),
            Granularity::Month => self.start.format("%Y-%m").to_string(),
        }
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.day0() as i64)
}

/// Sorted distinct periods touched by `timestamps`. No gaps are synthesized.
pub fn periods_present<I>(timestamps: I, granularity: Granularity, week_start: Weekday) -> Vec<Period>
where
    I: IntoIterator<Item = NaiveDateTime>,
{
    timestamps
        .into_iter()
        .map(|ts| Period::containing(ts, granularity, week_start))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Elapsed time from `earlier` to `later` in fractional days.
pub fn fractional_days(earlier: NaiveDateTime, later: NaiveDateTime) -> f64 {
    (later - earlier).num_seconds() as f64 / SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_month_period_bounds() {
        let p = Period::containing(ts("2024-02-17 13:00:00"), Granularity::Month, Weekday::Mon);
        assert_eq!(p.start, ts("2024-02-01 00:00:00"));
        assert_eq!(p.end, ts("2024-03-01 00:00:00"));
        assert_eq!(p.days(), 29);
        assert_eq!(p.label(), "2024-02");

        let dec = Period::containing(ts("2023-12-31 23:59:59"), Granularity::Month, Weekday::Mon);
        assert_eq!(dec.end, ts("2024-01-01 00:00:00"));
    }

    #[test]
    fn test_week_period_respects_week_start() {
        // 2024-03-14 is a Thursday.
        let monday = Period::containing(ts("2024-03-14 09:00:00"), Granularity::Week, Weekday::Mon);
        assert_eq!(monday.start, ts("2024-03-11 00:00:00"));
        assert_eq!(monday.label(), "2024-03-11/2024-03-17");

        let tuesday = Period::containing(ts("2024-03-14 09:00:00"), Granularity::Week, Weekday::Tue);
        assert_eq!(tuesday.start, ts("2024-03-12 00:00:00"));
        assert_eq!(tuesday.end, ts("2024-03-19 00:00:00"));
    }

    #[test]
    fn test_contains_is_half_open() {
        let p = Period::containing(ts("2024-05-10 00:00:00"), Granularity::Day, Weekday::Mon);
        assert!(p.contains(ts("2024-05-10 00:00:00")));
        assert!(p.contains(ts("2024-05-10 23:59:59")));
        assert!(!p.contains(ts("2024-05-11 00:00:00")));
    }

    #[test]
    fn test_periods_present_has_no_gaps_synthesized() {
        let periods = periods_present(
            vec![
                ts("2024-01-05 10:00:00"),
                ts("2024-03-02 10:00:00"),
                ts("2024-01-20 10:00:00"),
            ],
            Granularity::Month,
            Weekday::Mon,
        );
        let labels: Vec<_> = periods.iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec!["2024-01", "2024-03"]);
    }

    #[test]
    fn test_next_period() {
        let jan = Period::containing(ts("2024-01-31 10:00:00"), Granularity::Month, Weekday::Mon);
        assert_eq!(jan.next(Weekday::Mon).label(), "2024-02");
    }

    #[test]
    fn test_fractional_days() {
        let d = fractional_days(ts("2024-01-01 00:00:00"), ts("2024-01-02 12:00:00"));
        assert!((d - 1.5).abs() < 1e-12);
    }
}
