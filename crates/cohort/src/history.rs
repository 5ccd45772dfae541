//! Read-only per-member order timelines built once per run.

use chrono::NaiveDateTime;
use insights_core::{Event, MemberId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct MemberHistories {
    timelines: BTreeMap<MemberId, Vec<NaiveDateTime>>,
    guest_events: Vec<NaiveDateTime>,
}

impl MemberHistories {
    pub fn from_events(events: &[Event]) -> Self {
        let mut timelines: BTreeMap<MemberId, Vec<NaiveDateTime>> = BTreeMap::new();
        let mut guest_events = Vec::new();
        for event in events {
            match &event.member {
                Some(id) => timelines.entry(id.clone()).or_default().push(event.timestamp),
                None => guest_events.push(event.timestamp),
            }
        }
        for timeline in timelines.values_mut() {
            timeline.sort_unstable();
        }
        guest_events.sort_unstable();
        Self {
            timelines,
            guest_events,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MemberId, &[NaiveDateTime])> {
        self.timelines.iter().map(|(id, t)| (id, t.as_slice()))
    }

    pub fn get(&self, member: &MemberId) -> Option<&[NaiveDateTime]> {
        self.timelines.get(member).map(Vec::as_slice)
    }

    pub fn member_count(&self) -> usize {
        self.timelines.len()
    }

    pub fn guest_events_in(&self, from: NaiveDateTime, to: NaiveDateTime) -> usize {
        count_in(&self.guest_events, from, to)
    }

    pub fn is_empty(&self) -> bool {
        self.timelines.is_empty() && self.guest_events.is_empty()
    }
}

/// Number of sorted timestamps in `[from, to)`.
pub fn count_in(sorted: &[NaiveDateTime], from: NaiveDateTime, to: NaiveDateTime) -> usize {
    let lo = sorted.partition_point(|t| *t < from);
    let hi = sorted.partition_point(|t| *t < to);
    hi.saturating_sub(lo)
}

/// Latest timestamp strictly before `at`.
pub fn last_before(sorted: &[NaiveDateTime], at: NaiveDateTime) -> Option<NaiveDateTime> {
    let idx = sorted.partition_point(|t| *t < at);
    idx.checked_sub(1).map(|i| sorted[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_core::types::{CategoryTags, Channel};

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn event(member: Option<&str>, at: &str) -> Event {
        Event {
            member: member.map(|m| MemberId(m.to_string())),
            timestamp: ts(at),
            amount: 1.0,
            order_id: String::new(),
            tags: CategoryTags {
                channel: Channel::Space,
                payment_method: None,
                remark: None,
            },
        }
    }

    #[test]
    fn test_timelines_sorted_and_guests_separated() {
        let events = vec![
            event(Some("a"), "2024-02-01 00:00:00"),
            event(None, "2024-01-15 00:00:00"),
            event(Some("a"), "2024-01-01 00:00:00"),
        ];
        let histories = MemberHistories::from_events(&events);
        assert_eq!(histories.member_count(), 1);
        let a = histories.get(&MemberId("a".into())).unwrap();
        assert!(a[0] < a[1]);
        assert_eq!(
            histories.guest_events_in(ts("2024-01-01 00:00:00"), ts("2024-02-01 00:00:00")),
            1
        );
    }

    #[test]
    fn test_count_in_and_last_before() {
        let sorted = vec![
            ts("2024-01-01 00:00:00"),
            ts("2024-01-10 00:00:00"),
            ts("2024-01-20 00:00:00"),
        ];
        assert_eq!(count_in(&sorted, ts("2024-01-01 00:00:00"), ts("2024-01-20 00:00:00")), 2);
        assert_eq!(last_before(&sorted, ts("2024-01-10 00:00:00")), Some(ts("2024-01-01 00:00:00")));
        assert_eq!(last_before(&sorted, ts("2024-01-01 00:00:00")), None);
    }
}
