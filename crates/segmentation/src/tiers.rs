//! Order-count tiers and membership-tier spend summaries.

use chrono::NaiveDateTime;
use insights_core::period::fractional_days;
use insights_core::types::MemberDirectory;
use insights_core::{Event, MemberId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTier {
    Single,
    Double,
    ThreeToFive,
    SixToTen,
    OverTen,
}

impl OrderTier {
    pub const ALL: [OrderTier; 5] = [
        OrderTier::Single,
        OrderTier::Double,
        OrderTier::ThreeToFive,
        OrderTier::SixToTen,
        OrderTier::OverTen,
    ];

    pub fn for_orders(orders: usize) -> Self {
        match orders {
            0 | 1 => Self::Single,
            2 => Self::Double,
            3..=5 => Self::ThreeToFive,
            6..=10 => Self::SixToTen,
            _ => Self::OverTen,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Single => "1_order",
            Self::Double => "2_orders",
            Self::ThreeToFive => "3_5_orders",
            Self::SixToTen => "6_10_orders",
            Self::OverTen => "over_10_orders",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTierRow {
    pub tier: OrderTier,
    pub members: usize,
    pub orders: usize,
    pub total_spend: f64,
    /// Mean days between a member's first and last order.
    pub mean_span_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipTierRow {
    pub tier: i32,
    pub members: usize,
    pub orders: usize,
    pub total_spend: f64,
    pub mean_order_value: f64,
}

struct MemberTotals {
    first: NaiveDateTime,
    last: NaiveDateTime,
    orders: usize,
    spend: f64,
}

fn member_totals(events: &[Event]) -> BTreeMap<&MemberId, MemberTotals> {
    let mut totals: BTreeMap<&MemberId, MemberTotals> = BTreeMap::new();
    for event in events {
        let Some(member) = &event.member else {
            continue;
        };
        totals
            .entry(member)
            .and_modify(|t| {
                t.first = t.first.min(event.timestamp);
                t.last = t.last.max(event.timestamp);
                t.orders += 1;
                t.spend += event.amount;
            })
            .or_insert(MemberTotals {
                first: event.timestamp,
                last: event.timestamp,
                orders: 1,
                spend: event.amount,
            });
    }
    totals
}

/// Members bucketed by lifetime order count; every tier is reported.
pub fn order_tiers(events: &[Event]) -> Vec<OrderTierRow> {
    let mut rows: BTreeMap<OrderTier, (usize, usize, f64, f64)> =
        OrderTier::ALL.iter().map(|t| (*t, (0, 0, 0.0, 0.0))).collect();
    for totals in member_totals(events).values() {
        let row = rows.entry(OrderTier::for_orders(totals.orders)).or_default();
        row.0 += 1;
        row.1 += totals.orders;
        row.2 += totals.spend;
        row.3 += fractional_days(totals.first, totals.last);
    }
    rows.into_iter()
        .map(|(tier, (members, orders, spend, span))| OrderTierRow {
            tier,
            members,
            orders,
            total_spend: spend,
            mean_span_days: if members > 0 { span / members as f64 } else { 0.0 },
        })
        .collect()
}

/// Spend per membership tier. Members missing from the directory are
/// reported under the unknown tier; guests are left out.
pub fn membership_tiers(events: &[Event], directory: &MemberDirectory) -> Vec<MembershipTierRow> {
    let mut rows: BTreeMap<i32, (BTreeSet<&MemberId>, usize, f64)> = BTreeMap::new();
    for event in events {
        let Some(member) = &event.member else {
            continue;
        };
        let row = rows.entry(directory.tier_of(member)).or_default();
        row.0.insert(member);
        row.1 += 1;
        row.2 += event.amount;
    }
    rows.into_iter()
        .map(|(tier, (members, orders, spend))| MembershipTierRow {
            tier,
            members: members.len(),
            orders,
            total_spend: spend,
            mean_order_value: if orders > 0 { spend / orders as f64 } else { 0.0 },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use insights_core::types::{CategoryTags, Channel, MemberRecord, UNKNOWN_TIER};

    fn event(member: Option<&str>, day: i64, amount: f64) -> Event {
        let base = NaiveDateTime::parse_from_str("2024-01-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        Event {
            member: member.map(|m| MemberId(m.to_string())),
            timestamp: base + Duration::days(day),
            amount,
            order_id: String::new(),
            tags: CategoryTags {
                channel: Channel::Space,
                payment_method: None,
                remark: None,
            },
        }
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(OrderTier::for_orders(1), OrderTier::Single);
        assert_eq!(OrderTier::for_orders(2), OrderTier::Double);
        assert_eq!(OrderTier::for_orders(5), OrderTier::ThreeToFive);
        assert_eq!(OrderTier::for_orders(6), OrderTier::SixToTen);
        assert_eq!(OrderTier::for_orders(10), OrderTier::SixToTen);
        assert_eq!(OrderTier::for_orders(11), OrderTier::OverTen);
    }

    #[test]
    fn test_order_tiers_report_every_tier() {
        let mut events = vec![event(Some("once"), 0, 30.0)];
        for day in 0..3 {
            events.push(event(Some("thrice"), day * 10, 20.0));
        }
        events.push(event(None, 1, 99.0));
        let rows = order_tiers(&events);
        assert_eq!(rows.len(), 5);
        let three = rows.iter().find(|r| r.tier == OrderTier::ThreeToFive).unwrap();
        assert_eq!(three.members, 1);
        assert_eq!(three.orders, 3);
        assert!((three.total_spend - 60.0).abs() < 1e-9);
        assert!((three.mean_span_days - 20.0).abs() < 1e-9);
        let over = rows.iter().find(|r| r.tier == OrderTier::OverTen).unwrap();
        assert_eq!(over.members, 0);
        assert_eq!(over.mean_span_days, 0.0);
    }

    #[test]
    fn test_membership_tiers_with_unknown() {
        let directory = MemberDirectory::from_records(&[MemberRecord {
            member_id: Some("gold".into()),
            tier: Some(3),
        }]);
        let events = vec![
            event(Some("gold"), 0, 100.0),
            event(Some("gold"), 1, 50.0),
            event(Some("stranger"), 0, 10.0),
            event(None, 0, 500.0),
        ];
        let rows = membership_tiers(&events, &directory);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tier, UNKNOWN_TIER);
        assert_eq!(rows[1].tier, 3);
        assert_eq!(rows[1].members, 1);
        assert_eq!(rows[1].orders, 2);
        assert!((rows[1].mean_order_value - 75.0).abs() < 1e-9);
    }
}
