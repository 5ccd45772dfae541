//! Operational summaries of the space ledger: weekly finance, upgrade
//! uptake, utilization per space type, overtime and peak hours, first
//! versus repeat bookings, and combined group revenue.

use chrono::{NaiveDateTime, Timelike, Weekday};
use insights_core::config::UtilizationConfig;
use insights_core::types::SpaceBooking;
use insights_core::{Granularity, MemberId, Period};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const UNNAMED_SPACE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyFinance {
    pub period: Period,
    pub orders: usize,
    pub revenue: f64,
    pub mean_order_value: f64,
    pub members: usize,
    pub total_hours: f64,
    pub mean_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeSplit {
    pub period: Period,
    pub upgraded_orders: usize,
    pub upgraded_revenue: f64,
    pub regular_orders: usize,
    pub regular_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    pub period: Period,
    pub space_type: String,
    pub hours: f64,
    pub available_hours: f64,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRevenue {
    pub period: Period,
    pub space_revenue: f64,
    pub catering_revenue: f64,
}

/// Overtime uptake per space type and booked start hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvertimeRate {
    pub space_type: String,
    pub start_hour: u32,
    pub orders: usize,
    pub overtime_orders: usize,
    pub mean_paid: f64,
    pub overtime_rate_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakHour {
    pub start_hour: u32,
    pub orders: usize,
    pub revenue: f64,
    pub order_share_pct: f64,
    pub revenue_share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseComparison {
    pub first_order: bool,
    pub orders: usize,
    pub total_revenue: f64,
    pub mean_revenue: f64,
    pub mean_hours: f64,
}

fn space_type(booking: &SpaceBooking) -> String {
    booking
        .product_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNNAMED_SPACE)
        .to_string()
}

fn share(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        part / total * 100.0
    }
}

/// Hours actually used, falling back to the booked slot length.
fn used_hours(booking: &SpaceBooking) -> Option<f64> {
    booking.actual_hours.filter(|h| h.is_finite()).or_else(|| {
        let (start, end) = (booking.booking_start?, booking.booking_end?);
        Some((end - start).num_seconds() as f64 / 3600.0).filter(|h| *h >= 0.0)
    })
}

fn mean(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

pub fn weekly_finance(bookings: &[SpaceBooking], week_start: Weekday) -> Vec<WeeklyFinance> {
    #[derive(Default)]
    struct Acc {
        orders: usize,
        revenue: f64,
        members: BTreeSet<MemberId>,
        hours: f64,
        timed_orders: usize,
    }

    let mut weeks: BTreeMap<Period, Acc> = BTreeMap::new();
    for booking in bookings {
        let Some(ts) = booking.created_at else { continue };
        let acc = weeks
            .entry(Period::containing(ts, Granularity::Week, week_start))
            .or_default();
        acc.orders += 1;
        acc.revenue += booking.paid_amount;
        if let Some(id) = booking.identity() {
            acc.members.insert(id);
        }
        if let Some(hours) = used_hours(booking) {
            acc.hours += hours;
            acc.timed_orders += 1;
        }
    }
    weeks
        .into_iter()
        .map(|(period, acc)| WeeklyFinance {
            period,
            orders: acc.orders,
            revenue: acc.revenue,
            mean_order_value: mean(acc.revenue, acc.orders),
            members: acc.members.len(),
            total_hours: acc.hours,
            mean_hours: mean(acc.hours, acc.timed_orders),
        })
        .collect()
}

pub fn monthly_upgrades(bookings: &[SpaceBooking], week_start: Weekday) -> Vec<UpgradeSplit> {
    let mut months: BTreeMap<Period, UpgradeSplit> = BTreeMap::new();
    for booking in bookings {
        let Some(ts) = booking.created_at else { continue };
        let period = Period::containing(ts, Granularity::Month, week_start);
        let row = months.entry(period).or_insert(UpgradeSplit {
            period,
            upgraded_orders: 0,
            upgraded_revenue: 0.0,
            regular_orders: 0,
            regular_revenue: 0.0,
        });
        if booking.upgraded {
            row.upgraded_orders += 1;
            row.upgraded_revenue += booking.paid_amount;
        } else {
            row.regular_orders += 1;
            row.regular_revenue += booking.paid_amount;
        }
    }
    months.into_values().collect()
}

/// Weekly used hours per space type against `daily hours × 7`. Bookings are
/// placed by their slot start, or by creation time when no slot is known.
pub fn utilization(
    bookings: &[SpaceBooking],
    config: &UtilizationConfig,
    week_start: Weekday,
) -> Vec<Utilization> {
    let mut hours: BTreeMap<(Period, String), f64> = BTreeMap::new();
    for booking in bookings {
        let at: Option<NaiveDateTime> = booking.booking_start.or(booking.created_at);
        let (Some(at), Some(used)) = (at, used_hours(booking)) else {
            continue;
        };
        let space_type = space_type(booking);
        *hours
            .entry((Period::containing(at, Granularity::Week, week_start), space_type))
            .or_default() += used;
    }
    hours
        .into_iter()
        .map(|((period, space_type), used)| {
            let available = config.daily_hours_for(&space_type) * period.days() as f64;
            Utilization {
                period,
                utilization_pct: if available > 0.0 { used / available * 100.0 } else { 0.0 },
                space_type,
                hours: used,
                available_hours: available,
            }
        })
        .collect()
}

/// Bookings with any overtime, grouped by space type and the hour the slot
/// starts. Bookings without a slot start are left out.
pub fn overtime_by_slot(bookings: &[SpaceBooking]) -> Vec<OvertimeRate> {
    #[derive(Default)]
    struct Acc {
        orders: usize,
        overtime_orders: usize,
        paid: f64,
    }

    let mut slots: BTreeMap<(String, u32), Acc> = BTreeMap::new();
    for booking in bookings {
        let Some(start) = booking.booking_start else { continue };
        let acc = slots.entry((space_type(booking), start.hour())).or_default();
        acc.orders += 1;
        acc.paid += booking.paid_amount;
        if booking.overtime_minutes.is_some_and(|m| m > 0.0) {
            acc.overtime_orders += 1;
        }
    }
    slots
        .into_iter()
        .map(|((space_type, start_hour), acc)| OvertimeRate {
            space_type,
            start_hour,
            orders: acc.orders,
            overtime_orders: acc.overtime_orders,
            mean_paid: mean(acc.paid, acc.orders),
            overtime_rate_pct: share(acc.overtime_orders as f64, acc.orders as f64),
        })
        .collect()
}

/// Orders and revenue per booked start hour with their share of the total.
pub fn peak_hours(bookings: &[SpaceBooking]) -> Vec<PeakHour> {
    let mut hours: BTreeMap<u32, (usize, f64)> = BTreeMap::new();
    for booking in bookings {
        let Some(start) = booking.booking_start else { continue };
        let slot = hours.entry(start.hour()).or_default();
        slot.0 += 1;
        slot.1 += booking.paid_amount;
    }
    let total_orders: usize = hours.values().map(|(orders, _)| orders).sum();
    let total_revenue: f64 = hours.values().map(|(_, revenue)| revenue).sum();
    hours
        .into_iter()
        .map(|(start_hour, (orders, revenue))| PeakHour {
            start_hour,
            orders,
            revenue,
            order_share_pct: share(orders as f64, total_orders as f64),
            revenue_share_pct: share(revenue, total_revenue),
        })
        .collect()
}

/// Each member's earliest booking against all their later ones. Bookings
/// without a member or a creation time are left out; ties go to the row
/// that comes first.
pub fn first_vs_repeat(bookings: &[SpaceBooking]) -> [PurchaseComparison; 2] {
    let mut firsts: HashMap<MemberId, (NaiveDateTime, usize)> = HashMap::new();
    let mut dated = Vec::with_capacity(bookings.len());
    for (idx, booking) in bookings.iter().enumerate() {
        let (Some(member), Some(at)) = (booking.identity(), booking.created_at) else {
            continue;
        };
        let earliest = firsts.entry(member).or_insert((at, idx));
        if (at, idx) < *earliest {
            *earliest = (at, idx);
        }
        dated.push(idx);
    }
    let first_rows: BTreeSet<usize> = firsts.values().map(|(_, idx)| *idx).collect();

    [true, false].map(|first_order| {
        let group: Vec<&SpaceBooking> = dated
            .iter()
            .filter(|&&idx| first_rows.contains(&idx) == first_order)
            .map(|&idx| &bookings[idx])
            .collect();
        let total_revenue: f64 = group.iter().map(|b| b.paid_amount).sum();
        let hours: Vec<f64> = group.iter().filter_map(|b| used_hours(b)).collect();
        PurchaseComparison {
            first_order,
            orders: group.len(),
            total_revenue,
            mean_revenue: mean(total_revenue, group.len()),
            mean_hours: mean(hours.iter().sum(), hours.len()),
        }
    })
}

/// Space and catering revenue side by side; a week missing on either side
/// reports 0 for it.
pub fn group_revenue(space: &[(Period, f64)], catering: &[(Period, f64)]) -> Vec<GroupRevenue> {
    let mut weeks: BTreeMap<Period, (f64, f64)> = BTreeMap::new();
    for (period, value) in space {
        weeks.entry(*period).or_default().0 += value;
    }
    for (period, value) in catering {
        weeks.entry(*period).or_default().1 += value;
    }
    weeks
        .into_iter()
        .map(|(period, (space_revenue, catering_revenue))| GroupRevenue {
            period,
            space_revenue,
            catering_revenue,
        })
        .collect()
}
