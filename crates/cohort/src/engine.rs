//! Per-period lifecycle counts over full member histories.

use chrono::{Duration, NaiveDate, NaiveDateTime, Weekday};
use insights_core::config::CohortConfig;
use insights_core::period::periods_present;
use insights_core::{Event, Period};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::history::{count_in, last_before, MemberHistories};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowCount {
    pub days: u32,
    pub members: usize,
}

/// Members whose last order is more than `from_days` and at most `to_days`
/// old at the period end. `to_days == None` is the open-ended dormant band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandCount {
    pub from_days: u32,
    pub to_days: Option<u32>,
    pub members: usize,
}

impl BandCount {
    pub fn label(&self) -> String {
        match self.to_days {
            Some(to) => format!("churn_{}_{}d", self.from_days, to),
            None => format!("dormant_{}d_plus", self.from_days),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSnapshot {
    pub period: Period,
    pub active: Vec<WindowCount>,
    pub churn_bands: Vec<BandCount>,
    pub reactivated: usize,
    pub new_members: usize,
    pub repurchasing: usize,
    pub period_members: usize,
    pub repurchase_rate: f64,
    pub guest_orders: usize,
}

impl CohortSnapshot {
    pub fn active_for(&self, days: u32) -> Option<usize> {
        self.active.iter().find(|w| w.days == days).map(|w| w.members)
    }
}

pub struct CohortEngine {
    config: CohortConfig,
    week_start: Weekday,
}

impl CohortEngine {
    pub fn new(config: &CohortConfig, week_start: Weekday) -> Self {
        Self {
            config: config.clone(),
            week_start,
        }
    }

    /// Snapshots for every period present in the data.
    pub fn run(&self, events: &[Event]) -> Vec<CohortSnapshot> {
        let periods = periods_present(
            events.iter().map(|e| e.timestamp),
            self.config.granularity,
            self.week_start,
        );
        self.snapshots(events, &periods)
    }

    /// Snapshots for caller-supplied periods, in the order given. The first
    /// entry has no prior-period baseline.
    pub fn snapshots(&self, events: &[Event], periods: &[Period]) -> Vec<CohortSnapshot> {
        let histories = MemberHistories::from_events(events);
        let snapshots: Vec<_> = periods
            .iter()
            .enumerate()
            .map(|(idx, period)| self.snapshot_for(&histories, period, idx == 0))
            .collect();
        info!(
            periods = snapshots.len(),
            members = histories.member_count(),
            "Cohort snapshots computed"
        );
        snapshots
    }

    /// One period's counts. Periods are independent given the shared histories.
    /// `E` is the exclusive period end: active-N windows are `[E - N days, E)`
    /// and churn bands measure staleness `E - last` into `(from, to]`.
    pub fn snapshot_for(
        &self,
        histories: &MemberHistories,
        period: &Period,
        is_first: bool,
    ) -> CohortSnapshot {
        let start = period.start;
        let end = period.end;
        let edges = &self.config.churn_band_edges_days;

        let mut active = vec![0usize; self.config.active_windows_days.len()];
        let mut bands = vec![0usize; edges.len()];
        let mut reactivated = 0;
        let mut new_members = 0;
        let mut repurchasing = 0;
        let mut period_members = 0;

        for (_, timeline) in histories.iter() {
            let (Some(&first), Some(&last)) = (timeline.first(), timeline.last()) else {
                continue;
            };

            for (slot, &days) in active.iter_mut().zip(&self.config.active_windows_days) {
                if count_in(timeline, end - Duration::days(days as i64), end) > 0 {
                    *slot += 1;
                }
            }

            let in_period = count_in(timeline, start, end) > 0;
            if in_period {
                period_members += 1;
            }
            if period.contains(first) {
                new_members += 1;
            }

            if !is_first {
                if let Some(band) = churn_band(edges, end, last) {
                    bands[band] += 1;
                }
                if in_period && self.is_reactivation(timeline, start) {
                    reactivated += 1;
                }
            }

            let returning = !is_first && first < start;
            if in_period && (returning || repeat_first_period(timeline, period)) {
                repurchasing += 1;
            }
        }

        let churn_bands = edges
            .iter()
            .enumerate()
            .map(|(i, &from)| BandCount {
                from_days: from,
                to_days: edges.get(i + 1).copied(),
                members: bands[i],
            })
            .collect();

        let snapshot = CohortSnapshot {
            period: *period,
            active: self
                .config
                .active_windows_days
                .iter()
                .zip(active)
                .map(|(&days, members)| WindowCount { days, members })
                .collect(),
            churn_bands,
            reactivated,
            new_members,
            repurchasing,
            period_members,
            repurchase_rate: if period_members > 0 {
                repurchasing as f64 / period_members as f64
            } else {
                0.0
            },
            guest_orders: histories.guest_events_in(start, end),
        };
        debug!(
            period = %period.label(),
            new = snapshot.new_members,
            reactivated = snapshot.reactivated,
            repurchasing = snapshot.repurchasing,
            "Cohort period evaluated"
        );
        snapshot
    }

    /// The member's last order before `start` lies between the configured
    /// reactivation bounds.
    fn is_reactivation(&self, timeline: &[NaiveDateTime], start: NaiveDateTime) -> bool {
        let Some(previous) = last_before(timeline, start) else {
            return false;
        };
        let gap = start - previous;
        gap >= Duration::days(self.config.reactivation_min_days as i64)
            && gap <= Duration::days(self.config.reactivation_max_days as i64)
    }
}

/// Index of the staleness band `(edges[i], edges[i+1]]` (last band open-ended)
/// holding a member last seen at `last`, evaluated at `end`.
fn churn_band(edges: &[u32], end: NaiveDateTime, last: NaiveDateTime) -> Option<usize> {
    if last >= end {
        return None;
    }
    let stale = end - last;
    edges.iter().enumerate().rev().find_map(|(i, &from)| {
        let above = stale > Duration::days(from as i64);
        let below = edges
            .get(i + 1)
            .map_or(true, |&to| stale <= Duration::days(to as i64));
        (above && below).then_some(i)
    })
}

/// A first-time member who ordered on at least two distinct days in the period.
fn repeat_first_period(timeline: &[NaiveDateTime], period: &Period) -> bool {
    let Some(&first) = timeline.first() else {
        return false;
    };
    if !period.contains(first) {
        return false;
    }
    let days: BTreeSet<NaiveDate> = timeline
        .iter()
        .filter(|t| period.contains(**t))
        .map(|t| t.date())
        .collect();
    days.len() >= 2
}
