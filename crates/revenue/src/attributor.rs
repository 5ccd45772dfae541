//! Splits both ledgers into revenue categories and rolls them up into
//! balanced day and week entries.

use chrono::{NaiveDateTime, NaiveTime, Weekday};
use insights_core::config::RevenueConfig;
use insights_core::types::{CateringOrder, SpaceBooking, SupplementRevenue};
use insights_core::{Granularity, InsightsError, InsightsResult, Period};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::classify::{Classifier, RemarkClass};
use crate::ledger::{CateringSplit, Ledger, RevenueLedgerEntry, SpaceSplit};
use crate::payment::{PaymentMethod, PaymentResolver, PaymentSlot, SplitPayment};
use crate::rules::{normalize, SlotRule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleUsage {
    pub rule: SlotRule,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionReport {
    pub space_daily: Vec<RevenueLedgerEntry>,
    pub space_weekly: Vec<RevenueLedgerEntry>,
    pub catering_daily: Vec<RevenueLedgerEntry>,
    pub catering_weekly: Vec<RevenueLedgerEntry>,
    /// Records each normalization rule fired on, in precedence order.
    pub slot_rules: Vec<RuleUsage>,
    /// Catering orders dropped as deposits, final payments or write-offs.
    pub excluded_catering_orders: usize,
    pub skipped_rows: usize,
}

pub struct RevenueAttributor {
    config: RevenueConfig,
    resolver: PaymentResolver,
    classifier: Classifier,
    week_start: Weekday,
}

impl RevenueAttributor {
    pub fn new(config: &RevenueConfig, week_start: Weekday) -> Self {
        Self {
            config: config.clone(),
            resolver: PaymentResolver::new(&config.payment_aliases),
            classifier: Classifier::new(config),
            week_start,
        }
    }

    /// The booking's two payment slots. A slot with a method but no amount
    /// holds whatever the paid amount leaves after the other slot. A booking
    /// with neither method carries its paid amount as uncategorized slot 1
    /// money.
    pub fn split_payment(&self, booking: &SpaceBooking) -> SplitPayment {
        let method1 = self.resolver.resolve(booking.payment_method_1.as_deref());
        let method2 = self.resolver.resolve(booking.payment_method_2.as_deref());
        if method1.is_none() && method2.is_none() {
            return SplitPayment {
                slot1: PaymentSlot {
                    method: None,
                    amount: booking.paid_amount,
                },
                slot2: PaymentSlot::default(),
            };
        }

        let amount1 = match (booking.payment_amount_1, &method1) {
            (Some(amount), _) => amount,
            (None, Some(_)) => remainder(booking.paid_amount, booking.payment_amount_2.unwrap_or(0.0)),
            (None, None) => 0.0,
        };
        let amount2 = match (booking.payment_amount_2, &method2) {
            (Some(amount), _) => amount,
            (None, Some(_)) => remainder(booking.paid_amount, amount1),
            (None, None) => 0.0,
        };
        SplitPayment {
            slot1: PaymentSlot {
                method: method1,
                amount: amount1,
            },
            slot2: PaymentSlot {
                method: method2,
                amount: amount2,
            },
        }
    }

    /// Gross is the booking's paid amount. Settlement, welfare and event
    /// money come from the normalized slots; core is what remains.
    pub fn split_space(&self, booking: &SpaceBooking) -> SpaceSplit {
        let normalized = normalize(self.split_payment(booking));
        let SplitPayment { slot1, slot2 } = &normalized.payment;

        let mut split = SpaceSplit {
            order_id: booking.order_id.clone(),
            timestamp: booking.created_at,
            gross: booking.paid_amount,
            applied: normalized.applied.clone(),
            ..Default::default()
        };

        match &slot2.method {
            Some(PaymentMethod::MonthlySettlement) => split.settlement += slot2.amount,
            Some(PaymentMethod::WelfareCredit) => split.welfare += slot2.amount,
            Some(PaymentMethod::ThirdPartyReviewSite) => split.third_party += slot2.amount,
            _ => {}
        }
        match self.classifier.classify_remark(booking.remark.as_deref()) {
            Some(RemarkClass::Shoot) => split.event_shoot += slot1.amount,
            Some(RemarkClass::NamedEvent) => split.event_named += slot1.amount,
            None => {}
        }
        split.core =
            split.gross - split.settlement - split.welfare - split.event_shoot - split.event_named;
        split
    }

    /// `None` when the order is intentionally excluded from revenue.
    pub fn split_catering(&self, order: &CateringOrder) -> Option<CateringSplit> {
        if self.classifier.is_deposit_line(order.products.as_deref())
            || self.classifier.is_excluded_service(order.service_type.as_deref())
        {
            return None;
        }
        let event = self
            .classifier
            .classify_remark(order.products.as_deref())
            .is_some();
        Some(CateringSplit {
            order_id: order.order_id.clone(),
            timestamp: order.ordered_at,
            gross: order.net_amount,
            event_transferred: if event { order.net_amount } else { 0.0 },
            core: if event { 0.0 } else { order.net_amount },
        })
    }

    /// Dated gross receipts of the catering ledger after exclusions, with
    /// the supplement feed booked at the start of its day.
    pub fn catering_receipts(
        &self,
        orders: &[CateringOrder],
        supplement: &[SupplementRevenue],
    ) -> Vec<(NaiveDateTime, f64)> {
        let mut receipts: Vec<(NaiveDateTime, f64)> = orders
            .iter()
            .filter_map(|order| self.split_catering(order))
            .filter_map(|split| Some((split.timestamp?, split.gross)))
            .collect();
        receipts.extend(supplement.iter().map(|row| {
            (
                NaiveDateTime::new(row.date, NaiveTime::MIN),
                row.takeaway + row.group_purchase,
            )
        }));
        receipts
    }

    pub fn attribute(
        &self,
        space: &[SpaceBooking],
        catering: &[CateringOrder],
        supplement: Option<&[SupplementRevenue]>,
    ) -> InsightsResult<AttributionReport> {
        let mut skipped_rows = 0;
        let mut rule_counts: BTreeMap<SlotRule, usize> = BTreeMap::new();

        let mut space_splits = Vec::with_capacity(space.len());
        for booking in space {
            check_amounts("space", &booking.order_id, &space_amounts(booking))?;
            let split = self.split_space(booking);
            if split.timestamp.is_none() {
                skipped_rows += 1;
                continue;
            }
            for rule in &split.applied {
                *rule_counts.entry(*rule).or_default() += 1;
            }
            space_splits.push(split);
        }

        let mut excluded_catering_orders = 0;
        let mut catering_splits = Vec::with_capacity(catering.len());
        for order in catering {
            check_amounts("catering", &order.order_id, &[order.net_amount])?;
            let Some(split) = self.split_catering(order) else {
                excluded_catering_orders += 1;
                continue;
            };
            if split.timestamp.is_none() {
                skipped_rows += 1;
                continue;
            }
            catering_splits.push(split);
        }

        let supplement = match supplement {
            Some(rows) => rows,
            None => {
                warn!("Supplementary revenue feed missing, treating as zero");
                metrics::counter!("insights.supplement_missing").increment(1);
                &[]
            }
        };
        for row in supplement {
            check_amounts("supplement", &row.date.to_string(), &[row.takeaway, row.group_purchase])?;
        }
        if skipped_rows > 0 {
            warn!(skipped = skipped_rows, "Ledger rows without a timestamp skipped");
            metrics::counter!("insights.rows_skipped").increment(skipped_rows as u64);
        }

        let report = AttributionReport {
            space_daily: self.roll_up_space(&space_splits, Granularity::Day),
            space_weekly: self.roll_up_space(&space_splits, Granularity::Week),
            catering_daily: self.roll_up_catering(&catering_splits, supplement, Granularity::Day),
            catering_weekly: self.roll_up_catering(&catering_splits, supplement, Granularity::Week),
            slot_rules: SlotRule::ALL
                .iter()
                .map(|rule| RuleUsage {
                    rule: *rule,
                    records: rule_counts.get(rule).copied().unwrap_or(0),
                })
                .collect(),
            excluded_catering_orders,
            skipped_rows,
        };

        for entry in report
            .space_daily
            .iter()
            .chain(&report.space_weekly)
            .chain(&report.catering_daily)
            .chain(&report.catering_weekly)
        {
            entry.check_balance(self.config.balance_tolerance)?;
        }

        info!(
            space_orders = space_splits.len(),
            catering_orders = catering_splits.len(),
            excluded = excluded_catering_orders,
            supplement_days = supplement.len(),
            "Revenue attributed"
        );
        Ok(report)
    }

    fn roll_up_space(&self, splits: &[SpaceSplit], granularity: Granularity) -> Vec<RevenueLedgerEntry> {
        let mut entries: BTreeMap<Period, RevenueLedgerEntry> = BTreeMap::new();
        for split in splits {
            let Some(ts) = split.timestamp else { continue };
            let period = Period::containing(ts, granularity, self.week_start);
            entries
                .entry(period)
                .or_insert_with(|| RevenueLedgerEntry::new(Ledger::Space, period))
                .add_space(split);
        }
        debug!(?granularity, periods = entries.len(), "Space ledger rolled up");
        entries.into_values().collect()
    }

    fn roll_up_catering(
        &self,
        splits: &[CateringSplit],
        supplement: &[SupplementRevenue],
        granularity: Granularity,
    ) -> Vec<RevenueLedgerEntry> {
        let mut entries: BTreeMap<Period, RevenueLedgerEntry> = BTreeMap::new();
        for split in splits {
            let Some(ts) = split.timestamp else { continue };
            let period = Period::containing(ts, granularity, self.week_start);
            entries
                .entry(period)
                .or_insert_with(|| RevenueLedgerEntry::new(Ledger::Catering, period))
                .add_catering(split);
        }
        for row in supplement {
            let ts = NaiveDateTime::new(row.date, NaiveTime::MIN);
            let period = Period::containing(ts, granularity, self.week_start);
            entries
                .entry(period)
                .or_insert_with(|| RevenueLedgerEntry::new(Ledger::Catering, period))
                .add_supplement(row.takeaway, row.group_purchase);
        }
        debug!(?granularity, periods = entries.len(), "Catering ledger rolled up");
        entries.into_values().collect()
    }
}

/// Paid money not covered by the other slot, never negative.
fn remainder(paid: f64, other: f64) -> f64 {
    (paid - other).max(0.0)
}

fn space_amounts(booking: &SpaceBooking) -> [f64; 3] {
    [
        booking.paid_amount,
        booking.payment_amount_1.unwrap_or(0.0),
        booking.payment_amount_2.unwrap_or(0.0),
    ]
}

fn check_amounts(table: &str, order_id: &str, amounts: &[f64]) -> InsightsResult<()> {
    match amounts.iter().find(|a| !a.is_finite()) {
        Some(bad) => Err(InsightsError::data(
            table,
            format!("non-finite amount {bad} on `{order_id}`"),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(s: &str) -> Option<NaiveDateTime> {
        Some(NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap())
    }

    fn attributor() -> RevenueAttributor {
        RevenueAttributor::new(&RevenueConfig::default(), Weekday::Mon)
    }

    fn booking(
        id: &str,
        at: &str,
        slot1: Option<(&str, f64)>,
        slot2: Option<(&str, f64)>,
        remark: Option<&str>,
    ) -> SpaceBooking {
        SpaceBooking {
            order_id: id.into(),
            created_at: ts(at),
            paid_amount: slot1.map(|s| s.1).unwrap_or(0.0) + slot2.map(|s| s.1).unwrap_or(0.0),
            payment_method_1: slot1.map(|s| s.0.to_string()),
            payment_amount_1: slot1.map(|s| s.1),
            payment_method_2: slot2.map(|s| s.0.to_string()),
            payment_amount_2: slot2.map(|s| s.1),
            remark: remark.map(str::to_string),
            ..Default::default()
        }
    }

    fn catering(id: &str, at: &str, products: &str, amount: f64) -> CateringOrder {
        CateringOrder {
            order_id: id.into(),
            ordered_at: ts(at),
            products: Some(products.into()),
            net_amount: amount,
            ..Default::default()
        }
    }

    #[test]
    fn test_space_split_categories() {
        let a = attributor();
        let settled = a.split_space(&booking(
            "1",
            "2024-03-04 10:00:00",
            Some(("月结", 200.0)),
            None,
            None,
        ));
        assert_eq!(settled.applied, vec![SlotRule::MoveNonNativeToSecondary]);
        assert_eq!(settled.settlement, 200.0);
        assert_eq!(settled.core, 0.0);

        let shoot = a.split_space(&booking(
            "2",
            "2024-03-04 11:00:00",
            Some(("微信支付", 120.0)),
            Some(("福利卡", 30.0)),
            Some("品牌拍摄"),
        ));
        assert_eq!(shoot.event_shoot, 120.0);
        assert_eq!(shoot.welfare, 30.0);
        assert_eq!(shoot.gross, 150.0);

        let review = a.split_space(&booking(
            "3",
            "2024-03-04 12:00:00",
            Some(("美团", 40.0)),
            Some(("微信支付", 10.0)),
            None,
        ));
        assert_eq!(review.third_party, 40.0);
        assert_eq!(review.core, 50.0);
    }

    #[test]
    fn test_empty_slots_fall_back_to_paid_amount() {
        let a = attributor();
        let split = a.split_space(&SpaceBooking {
            order_id: "x".into(),
            created_at: ts("2024-03-04 10:00:00"),
            paid_amount: 66.0,
            ..Default::default()
        });
        assert_eq!(split.gross, 66.0);
        assert_eq!(split.core, 66.0);
        assert!(split.applied.is_empty());
    }

    #[test]
    fn test_gross_is_paid_amount_when_slots_disagree() {
        let a = attributor();
        let mut unpriced = booking("p", "2024-03-04 10:00:00", Some(("微信支付", 0.0)), None, None);
        unpriced.payment_amount_1 = None;
        unpriced.paid_amount = 100.0;
        let split = a.split_space(&unpriced);
        assert_eq!(split.gross, 100.0);
        assert_eq!(split.core, 100.0);

        let mut short = booking(
            "s",
            "2024-03-04 11:00:00",
            Some(("微信支付", 50.0)),
            Some(("福利卡", 30.0)),
            None,
        );
        short.paid_amount = 120.0;
        let split = a.split_space(&short);
        assert_eq!(split.gross, 120.0);
        assert_eq!(split.welfare, 30.0);
        assert_eq!(split.core, 90.0);
    }

    #[test]
    fn test_missing_slot_amount_filled_from_paid_amount() {
        let a = attributor();
        let mut welfare = booking(
            "w",
            "2024-03-04 10:00:00",
            Some(("微信支付", 70.0)),
            Some(("福利卡", 0.0)),
            None,
        );
        welfare.payment_amount_2 = None;
        welfare.paid_amount = 100.0;
        let payment = a.split_payment(&welfare);
        assert_eq!(payment.slot2.amount, 30.0);

        let split = a.split_space(&welfare);
        assert_eq!(split.welfare, 30.0);
        assert_eq!(split.core, 70.0);

        let report = a.attribute(&[welfare], &[], Some(&[])).unwrap();
        assert_eq!(report.space_weekly[0].gross, 100.0);
    }

    #[test]
    fn test_catering_exclusions_and_event_transfer() {
        let a = attributor();
        assert!(a.split_catering(&catering("d", "2024-03-04 09:00:00", "蛋糕定金", 100.0)).is_none());
        let mut written_off = catering("w", "2024-03-04 09:00:00", "拿铁", 30.0);
        written_off.service_type = Some("报损".into());
        assert!(a.split_catering(&written_off).is_none());

        let event = a
            .split_catering(&catering("e", "2024-03-04 09:00:00", "沙龙茶歇套餐", 300.0))
            .unwrap();
        assert_eq!(event.event_transferred, 300.0);
        assert_eq!(event.core, 0.0);
    }

    #[test]
    fn test_attribute_balances_every_period() {
        let a = attributor();
        let space = vec![
            booking("1", "2024-03-04 10:00:00", Some(("微信支付", 50.0)), Some(("微信支付", 30.0)), None),
            booking("2", "2024-03-05 10:00:00", Some(("月结", 0.1)), None, None),
            booking("3", "2024-03-12 10:00:00", Some(("美团", 0.2)), Some(("微信支付", 0.7)), Some("活动")),
        ];
        let catering_orders = vec![
            catering("c1", "2024-03-04 08:00:00", "拿铁", 25.0),
            catering("c2", "2024-03-04 08:30:00", "尾款 生日会", 500.0),
            catering("c3", "2024-03-13 08:30:00", "活动茶歇", 90.0),
        ];
        let supplement = vec![SupplementRevenue {
            date: NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(),
            takeaway: 12.5,
            group_purchase: 7.5,
        }];
        let report = a.attribute(&space, &catering_orders, Some(&supplement)).unwrap();

        assert_eq!(report.space_weekly.len(), 2);
        assert_eq!(report.space_daily.len(), 3);
        assert_eq!(report.excluded_catering_orders, 1);
        let merge = report.slot_rules.iter().find(|u| u.rule == SlotRule::MergeNative).unwrap();
        assert_eq!(merge.records, 1);
        let swap = report.slot_rules.iter().find(|u| u.rule == SlotRule::SwapReviewSite).unwrap();
        assert_eq!(swap.records, 1);

        let first_week = &report.catering_weekly[0];
        assert!((first_week.gross - 45.0).abs() < 1e-9);
        assert!((first_week.takeaway - 12.5).abs() < 1e-9);
        assert_eq!(report.catering_daily.len(), 3);

        for entry in report.space_weekly.iter().chain(&report.catering_weekly) {
            let rel = (entry.gross - entry.attributed()).abs() / entry.gross.abs().max(1.0);
            assert!(rel <= 1e-6, "{}", entry.period.label());
        }
        let second_week = &report.space_weekly[1];
        assert!((second_week.event_named - 0.7).abs() < 1e-9);
        assert!((second_week.third_party - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_catering_receipts_match_ledger_gross() {
        let a = attributor();
        let orders = vec![
            catering("c1", "2024-03-04 08:00:00", "拿铁", 20.0),
            catering("c2", "2024-03-04 09:00:00", "生日蛋糕定金", 500.0),
        ];
        let supplement = vec![SupplementRevenue {
            date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            takeaway: 4.0,
            group_purchase: 6.0,
        }];
        let receipts = a.catering_receipts(&orders, &supplement);
        assert_eq!(receipts.len(), 2);
        let total: f64 = receipts.iter().map(|(_, v)| v).sum();

        let report = a.attribute(&[], &orders, Some(&supplement)).unwrap();
        assert_eq!(report.catering_weekly.len(), 1);
        assert!((total - report.catering_weekly[0].gross).abs() < 1e-9);
        assert!((total - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_supplement_is_zero_filled() {
        let a = attributor();
        let report = a
            .attribute(&[], &[catering("c1", "2024-03-04 08:00:00", "拿铁", 25.0)], None)
            .unwrap();
        assert_eq!(report.catering_weekly.len(), 1);
        assert_eq!(report.catering_weekly[0].takeaway, 0.0);
        assert!((report.catering_weekly[0].core - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_rows_without_timestamp_skipped_and_bad_amounts_rejected() {
        let a = attributor();
        let mut undated = booking("u", "2024-03-04 10:00:00", Some(("微信支付", 5.0)), None, None);
        undated.created_at = None;
        let report = a.attribute(&[undated], &[], Some(&[])).unwrap();
        assert_eq!(report.skipped_rows, 1);
        assert!(report.space_daily.is_empty());

        let mut broken = booking("b", "2024-03-04 10:00:00", Some(("微信支付", 5.0)), None, None);
        broken.payment_amount_1 = Some(f64::INFINITY);
        let err = a.attribute(&[broken], &[], Some(&[])).unwrap_err();
        assert_eq!(err.kind(), "data_error");
    }
}
