//! Per-member lifecycle state relative to a snapshot instant.
//!
//! `never_ordered → new → active → at_risk_30_60 → at_risk_60_90 →
//! churned_90_120 → dormant_120_plus`; an order placed while at risk,
//! churned or dormant re-enters through `reactivated`. State names follow
//! the default churn band edges; the actual boundaries come from
//! `cohort.churn_band_edges_days`.

use chrono::{Duration, NaiveDateTime};
use insights_core::config::CohortConfig;
use insights_core::MemberId;
use serde::{Deserialize, Serialize};

use crate::history::MemberHistories;

/// Staleness boundaries in days, taken from the cohort churn band edges so
/// lifecycle states line up with the snapshot bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleThresholds {
    pub active: i64,
    pub at_risk: i64,
    pub churning: i64,
    pub churned: i64,
}

impl LifecycleThresholds {
    /// Edges past the configured ones repeat the last edge, which leaves
    /// the states in between empty.
    pub fn from_config(config: &CohortConfig) -> Self {
        let edges = &config.churn_band_edges_days;
        let edge = |i: usize| edges.get(i).or(edges.last()).copied().unwrap_or(0) as i64;
        Self {
            active: edge(0),
            at_risk: edge(1),
            churning: edge(2),
            churned: edge(3),
        }
    }
}

impl Default for LifecycleThresholds {
    fn default() -> Self {
        Self::from_config(&CohortConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    NeverOrdered,
    New,
    Active,
    Reactivated,
    AtRisk30To60,
    AtRisk60To90,
    Churned90To120,
    Dormant120Plus,
}

impl MemberState {
    pub const ALL: [MemberState; 8] = [
        MemberState::NeverOrdered,
        MemberState::New,
        MemberState::Active,
        MemberState::Reactivated,
        MemberState::AtRisk30To60,
        MemberState::AtRisk60To90,
        MemberState::Churned90To120,
        MemberState::Dormant120Plus,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::NeverOrdered => "never_ordered",
            Self::New => "new",
            Self::Active => "active",
            Self::Reactivated => "reactivated",
            Self::AtRisk30To60 => "at_risk_30_60",
            Self::AtRisk60To90 => "at_risk_60_90",
            Self::Churned90To120 => "churned_90_120",
            Self::Dormant120Plus => "dormant_120_plus",
        }
    }

    /// States an order moves into `Reactivated`.
    pub fn is_lapsed(&self) -> bool {
        matches!(
            self,
            Self::AtRisk30To60 | Self::AtRisk60To90 | Self::Churned90To120 | Self::Dormant120Plus
        )
    }

    /// State of an ordering member whose last order is `stale` old, ignoring
    /// how they entered the active window.
    pub fn from_staleness(stale: Duration, thresholds: &LifecycleThresholds) -> Self {
        if stale <= Duration::days(thresholds.active) {
            Self::Active
        } else if stale <= Duration::days(thresholds.at_risk) {
            Self::AtRisk30To60
        } else if stale <= Duration::days(thresholds.churning) {
            Self::AtRisk60To90
        } else if stale <= Duration::days(thresholds.churned) {
            Self::Churned90To120
        } else {
            Self::Dormant120Plus
        }
    }
}

/// Classify one member at `at` from their sorted order timeline. Orders at
/// or after `at` are not yet visible.
pub fn classify(
    timeline: &[NaiveDateTime],
    at: NaiveDateTime,
    thresholds: &LifecycleThresholds,
) -> MemberState {
    let visible = &timeline[..timeline.partition_point(|t| *t < at)];
    let (Some(&first), Some(&last)) = (visible.first(), visible.last()) else {
        return MemberState::NeverOrdered;
    };

    let state = MemberState::from_staleness(at - last, thresholds);
    if state != MemberState::Active {
        return state;
    }

    let window_start = at - Duration::days(thresholds.active);
    if first >= window_start {
        return MemberState::New;
    }
    // The earliest order inside the window and the one before it decide
    // whether the member came back from a lapsed state.
    let idx = visible.partition_point(|t| *t < window_start);
    let previous_state = MemberState::from_staleness(visible[idx] - visible[idx - 1], thresholds);
    if previous_state.is_lapsed() {
        MemberState::Reactivated
    } else {
        MemberState::Active
    }
}

/// Member count per state at `at`, in `MemberState::ALL` order. Roster
/// members without any visible order count as `NeverOrdered`.
pub fn state_distribution<'a, I>(
    histories: &MemberHistories,
    roster: I,
    at: NaiveDateTime,
    thresholds: &LifecycleThresholds,
) -> Vec<(MemberState, usize)>
where
    I: IntoIterator<Item = &'a MemberId>,
{
    let mut counts = [0usize; MemberState::ALL.len()];
    for (_, timeline) in histories.iter() {
        counts[state_index(classify(timeline, at, thresholds))] += 1;
    }
    for member in roster {
        if histories.get(member).is_none() {
            counts[state_index(MemberState::NeverOrdered)] += 1;
        }
    }
    MemberState::ALL.into_iter().zip(counts).collect()
}

fn state_index(state: MemberState) -> usize {
    MemberState::ALL
        .iter()
        .position(|s| *s == state)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_core::types::{CategoryTags, Channel};
    use insights_core::Event;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn defaults() -> LifecycleThresholds {
        LifecycleThresholds::default()
    }

    fn days_before(at: NaiveDateTime, days: i64) -> NaiveDateTime {
        at - Duration::days(days)
    }

    #[test]
    fn test_never_ordered_and_new() {
        let at = ts("2024-06-01 00:00:00");
        assert_eq!(classify(&[], at, &defaults()), MemberState::NeverOrdered);
        assert_eq!(classify(&[at], at, &defaults()), MemberState::NeverOrdered);
        assert_eq!(classify(&[days_before(at, 3)], at, &defaults()), MemberState::New);
    }

    #[test]
    fn test_staleness_progression() {
        let at = ts("2024-06-01 00:00:00");
        let cases = [
            (45, MemberState::AtRisk30To60),
            (75, MemberState::AtRisk60To90),
            (100, MemberState::Churned90To120),
            (200, MemberState::Dormant120Plus),
        ];
        for (days, expected) in cases {
            assert_eq!(classify(&[days_before(at, days)], at, &defaults()), expected, "{days} days");
        }
    }

    #[test]
    fn test_active_vs_reactivated() {
        let at = ts("2024-06-01 00:00:00");
        let steady = [days_before(at, 50), days_before(at, 25), days_before(at, 5)];
        assert_eq!(classify(&steady, at, &defaults()), MemberState::Active);

        let returning = [days_before(at, 150), days_before(at, 10)];
        assert_eq!(classify(&returning, at, &defaults()), MemberState::Reactivated);
    }

    #[test]
    fn test_lapsed_states() {
        assert!(MemberState::Dormant120Plus.is_lapsed());
        assert!(MemberState::AtRisk30To60.is_lapsed());
        assert!(!MemberState::New.is_lapsed());
        assert!(!MemberState::Reactivated.is_lapsed());
    }

    #[test]
    fn test_distribution_includes_roster_never_ordered() {
        let at = ts("2024-06-01 00:00:00");
        let events = vec![Event {
            member: Some(MemberId("a".into())),
            timestamp: days_before(at, 2),
            amount: 5.0,
            order_id: String::new(),
            tags: CategoryTags {
                channel: Channel::Catering,
                payment_method: None,
                remark: None,
            },
        }];
        let histories = MemberHistories::from_events(&events);
        let roster = vec![MemberId("a".into()), MemberId("ghost".into())];
        let dist = state_distribution(&histories, &roster, at, &defaults());
        assert_eq!(dist.len(), MemberState::ALL.len());
        let get = |s: MemberState| dist.iter().find(|(st, _)| *st == s).map(|(_, n)| *n);
        assert_eq!(get(MemberState::New), Some(1));
        assert_eq!(get(MemberState::NeverOrdered), Some(1));
        assert_eq!(get(MemberState::Dormant120Plus), Some(0));
    }

    #[test]
    fn test_thresholds_follow_configured_band_edges() {
        let at = ts("2024-06-01 00:00:00");
        let config = CohortConfig {
            churn_band_edges_days: vec![14, 28, 42, 56],
            ..CohortConfig::default()
        };
        let thresholds = LifecycleThresholds::from_config(&config);
        assert_eq!(classify(&[days_before(at, 10)], at, &thresholds), MemberState::New);
        assert_eq!(classify(&[days_before(at, 20)], at, &thresholds), MemberState::AtRisk30To60);
        assert_eq!(classify(&[days_before(at, 50)], at, &thresholds), MemberState::Churned90To120);
        assert_eq!(classify(&[days_before(at, 60)], at, &thresholds), MemberState::Dormant120Plus);

        let short = CohortConfig {
            churn_band_edges_days: vec![30, 60],
            ..CohortConfig::default()
        };
        let thresholds = LifecycleThresholds::from_config(&short);
        assert_eq!(thresholds.churned, 60);
        assert_eq!(classify(&[days_before(at, 75)], at, &thresholds), MemberState::Dormant120Plus);
    }
}
