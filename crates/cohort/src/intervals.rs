//! Days between consecutive orders of the same member, grouped by the
//! period of the later order.

use chrono::Weekday;
use insights_core::period::fractional_days;
use insights_core::{Granularity, Period};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::history::MemberHistories;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalSummary {
    pub period: Period,
    pub repeat_orders: usize,
    pub mean_interval_days: f64,
    pub max_interval_days: f64,
}

pub fn order_intervals(
    histories: &MemberHistories,
    granularity: Granularity,
    week_start: Weekday,
) -> Vec<IntervalSummary> {
    let mut gaps: BTreeMap<Period, Vec<f64>> = BTreeMap::new();
    for (_, timeline) in histories.iter() {
        for pair in timeline.windows(2) {
            let period = Period::containing(pair[1], granularity, week_start);
            gaps.entry(period)
                .or_default()
                .push(fractional_days(pair[0], pair[1]));
        }
    }

    gaps.into_iter()
        .map(|(period, values)| {
            let total: f64 = values.iter().sum();
            IntervalSummary {
                period,
                repeat_orders: values.len(),
                mean_interval_days: total / values.len() as f64,
                max_interval_days: values.iter().copied().fold(0.0, f64::max),
            }
        })
        .collect()
}
