//! Runs every analysis module over the source tables and composes the
//! report document. A module that fails leaves a `Section::Failed` marker
//! and the others still run; a required table that is missing fails the
//! whole run.

use chrono::{NaiveDateTime, Weekday};
use insights_cohort::intervals::order_intervals;
use insights_cohort::lifecycle::{state_distribution, LifecycleThresholds};
use insights_cohort::{CohortEngine, MemberHistories};
use insights_core::types::{
    catering_events, space_events, CateringOrder, MemberDirectory, SpaceBooking, SupplementRevenue,
};
use insights_core::{AppConfig, Event, Granularity, InsightsError, InsightsResult, Period, SourceTables};
use insights_revenue::{RevenueAttributor, RevenueLedgerEntry};
use insights_segmentation::{membership_tiers, order_tiers, score_distribution, RfmScorer};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::document::{ReportDocument, Row, RowBuilder, Section, Tables};
use crate::operations::{
    first_vs_repeat, group_revenue, monthly_upgrades, overtime_by_slot, peak_hours, utilization,
    weekly_finance,
};
use crate::trend::{periodize, TrendAggregator};

pub const COHORT: &str = "cohort";
pub const RFM: &str = "rfm";
pub const ATTRIBUTION: &str = "attribution";
pub const TREND: &str = "trend";
pub const OPERATIONS: &str = "operations";

/// Tables every module reads, resolved once per run.
struct Inputs<'a> {
    space: &'a [SpaceBooking],
    catering: &'a [CateringOrder],
    supplement: Option<&'a [SupplementRevenue]>,
    directory: MemberDirectory,
}

pub struct InsightsEngine {
    config: AppConfig,
}

impl InsightsEngine {
    pub fn new(config: AppConfig) -> Self {
        info!(
            week_start = %config.week_start,
            lambda = config.rfm.decay_lambda,
            weight = config.rfm.monetary_weight,
            "Insights engine initialized"
        );
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn run(&self, tables: &SourceTables) -> InsightsResult<ReportDocument> {
        let space = tables
            .space
            .as_deref()
            .ok_or_else(|| InsightsError::Upstream("space booking ledger".into()))?;
        let catering = tables
            .catering
            .as_deref()
            .ok_or_else(|| InsightsError::Upstream("catering ledger".into()))?;
        let members = match tables.members.as_deref() {
            Some(rows) => rows,
            None => {
                warn!("Member reference table missing, all members get the unknown tier");
                &[]
            }
        };
        let inputs = Inputs {
            space,
            catering,
            supplement: tables.supplement.as_deref(),
            directory: MemberDirectory::from_records(members),
        };
        info!(
            space_rows = space.len(),
            catering_rows = catering.len(),
            members = inputs.directory.len(),
            "Insights run started"
        );

        let mut sections = BTreeMap::new();
        sections.insert(COHORT.to_string(), self.isolated(COHORT, || self.cohort_section(&inputs))?);
        sections.insert(RFM.to_string(), self.isolated(RFM, || self.rfm_section(&inputs))?);
        sections.insert(
            ATTRIBUTION.to_string(),
            self.isolated(ATTRIBUTION, || self.attribution_section(&inputs))?,
        );
        sections.insert(TREND.to_string(), self.isolated(TREND, || self.trend_section(&inputs))?);
        sections.insert(
            OPERATIONS.to_string(),
            self.isolated(OPERATIONS, || self.operations_section(&inputs))?,
        );

        let failed = sections.values().filter(|s| s.is_failed()).count();
        info!(sections = sections.len(), failed, "Insights run finished");
        Ok(ReportDocument::new(sections))
    }

    /// Runs one module. Its errors become a failure marker, except fatal
    /// ones which abort the run.
    fn isolated<F>(&self, module: &str, f: F) -> InsightsResult<Section>
    where
        F: FnOnce() -> InsightsResult<Tables>,
    {
        let started = Instant::now();
        match f() {
            Ok(tables) => {
                let rows: usize = tables.values().map(Vec::len).sum();
                info!(
                    module,
                    tables = tables.len(),
                    rows,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Module completed"
                );
                metrics::counter!("insights.module_completed", "module" => module.to_string())
                    .increment(1);
                Ok(Section::Tables(tables))
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                error!(module, kind = err.kind(), error = %err, "Module failed");
                metrics::counter!("insights.module_failed", "module" => module.to_string())
                    .increment(1);
                Ok(Section::failed(&err))
            }
        }
    }

    /// Member events from both ledgers. Bookings of excluded tiers are
    /// dropped before anything else sees them.
    fn member_events(&self, inputs: &Inputs) -> InsightsResult<Vec<Event>> {
        let space = space_events(
            inputs.space,
            &inputs.directory,
            &self.config.members.excluded_tiers,
        )?;
        let catering = catering_events(inputs.catering)?;
        let skipped = space.skipped_rows + catering.skipped_rows;
        if skipped > 0 {
            metrics::counter!("insights.rows_skipped").increment(skipped as u64);
        }
        let mut events = space.events;
        events.extend(catering.events);
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    /// Weekly catering gross with the same exclusions and supplement feed
    /// as the attribution ledger.
    fn catering_revenue(&self, attributor: &RevenueAttributor, inputs: &Inputs) -> Vec<(Period, f64)> {
        let supplement = inputs.supplement.unwrap_or(&[]);
        periodize(
            attributor.catering_receipts(inputs.catering, supplement),
            Granularity::Week,
            self.config.week_start,
        )
    }

    // ─── Cohort ─────────────────────────────────────────────────────────────

    fn cohort_section(&self, inputs: &Inputs) -> InsightsResult<Tables> {
        let events = self.member_events(inputs)?;
        let engine = CohortEngine::new(&self.config.cohort, self.config.week_start);
        let histories = MemberHistories::from_events(&events);

        let snapshots: Vec<Row> = engine
            .run(&events)
            .iter()
            .map(|s| {
                let mut row = RowBuilder::new().period(&s.period);
                for window in &s.active {
                    row = row.count(&format!("active_{}d", window.days), window.members);
                }
                for band in &s.churn_bands {
                    row = row.count(&band.label(), band.members);
                }
                row.count("reactivated", s.reactivated)
                    .count("new_members", s.new_members)
                    .count("repurchasing", s.repurchasing)
                    .count("period_members", s.period_members)
                    .num("repurchase_rate", s.repurchase_rate)
                    .count("guest_orders", s.guest_orders)
                    .build()
            })
            .collect();

        let thresholds = LifecycleThresholds::from_config(&self.config.cohort);
        let lifecycle_states: Vec<Row> = match as_of(&events) {
            Some(at) => state_distribution(&histories, inputs.directory.members(), at, &thresholds)
                .into_iter()
                .map(|(state, members)| {
                    RowBuilder::new()
                        .text("as_of", at.format("%Y-%m-%d").to_string())
                        .text("state", state.label())
                        .count("members", members)
                        .build()
                })
                .collect(),
            None => Vec::new(),
        };

        let intervals: Vec<Row> =
            order_intervals(&histories, self.config.cohort.granularity, self.config.week_start)
                .iter()
                .map(|s| {
                    RowBuilder::new()
                        .period(&s.period)
                        .count("repeat_orders", s.repeat_orders)
                        .num("mean_interval_days", s.mean_interval_days)
                        .num("max_interval_days", s.max_interval_days)
                        .build()
                })
                .collect();

        Ok(Tables::from([
            ("snapshots".to_string(), snapshots),
            ("lifecycle_states".to_string(), lifecycle_states),
            ("order_intervals".to_string(), intervals),
        ]))
    }

    // ─── RFM ────────────────────────────────────────────────────────────────

    fn rfm_section(&self, inputs: &Inputs) -> InsightsResult<Tables> {
        let events = self.member_events(inputs)?;
        let report = RfmScorer::new(&self.config.rfm).score(&events);

        let members: Vec<Row> = report
            .records
            .iter()
            .map(|r| {
                RowBuilder::new()
                    .text("member_id", r.member.as_str())
                    .int("tier", inputs.directory.tier_of(&r.member) as i64)
                    .text("last_order", r.last_order.format("%Y-%m-%d %H:%M:%S").to_string())
                    .num("total_spend", r.total_spend)
                    .count("order_count", r.order_count)
                    .num("recency_days", r.recency_days)
                    .num("recency_index", r.recency_index)
                    .num("monetary_index", r.monetary_index)
                    .num("frequency_index", r.frequency_index)
                    .num("value_score", r.value_score)
                    .build()
            })
            .collect();

        let distribution: Vec<Row> = score_distribution(&report.records, self.config.rfm.bins)
            .iter()
            .map(|d| {
                RowBuilder::new()
                    .count("bin", d.bin)
                    .count("value_score", d.value_score)
                    .count("recency_index", d.recency_index)
                    .count("monetary_index", d.monetary_index)
                    .count("frequency_index", d.frequency_index)
                    .build()
            })
            .collect();

        let tiers_by_orders: Vec<Row> = order_tiers(&events)
            .iter()
            .map(|t| {
                RowBuilder::new()
                    .text("tier", t.tier.label())
                    .count("members", t.members)
                    .count("orders", t.orders)
                    .num("total_spend", t.total_spend)
                    .num("mean_span_days", t.mean_span_days)
                    .build()
            })
            .collect();

        let tiers_by_membership: Vec<Row> = membership_tiers(&events, &inputs.directory)
            .iter()
            .map(|t| {
                RowBuilder::new()
                    .int("tier", t.tier as i64)
                    .count("members", t.members)
                    .count("orders", t.orders)
                    .num("total_spend", t.total_spend)
                    .num("mean_order_value", t.mean_order_value)
                    .build()
            })
            .collect();

        Ok(Tables::from([
            ("members".to_string(), members),
            ("distribution".to_string(), distribution),
            ("order_tiers".to_string(), tiers_by_orders),
            ("membership_tiers".to_string(), tiers_by_membership),
        ]))
    }

    // ─── Attribution ────────────────────────────────────────────────────────

    fn attribution_section(&self, inputs: &Inputs) -> InsightsResult<Tables> {
        let attributor = RevenueAttributor::new(&self.config.revenue, self.config.week_start);
        let report = attributor.attribute(inputs.space, inputs.catering, inputs.supplement)?;

        let slot_rules: Vec<Row> = report
            .slot_rules
            .iter()
            .map(|u| {
                RowBuilder::new()
                    .text("rule", u.rule.label())
                    .count("records", u.records)
                    .build()
            })
            .collect();

        Ok(Tables::from([
            ("space_daily".to_string(), ledger_rows(&report.space_daily)),
            ("space_weekly".to_string(), ledger_rows(&report.space_weekly)),
            ("catering_daily".to_string(), ledger_rows(&report.catering_daily)),
            ("catering_weekly".to_string(), ledger_rows(&report.catering_weekly)),
            ("slot_rules".to_string(), slot_rules),
        ]))
    }

    // ─── Trend ──────────────────────────────────────────────────────────────

    fn trend_section(&self, inputs: &Inputs) -> InsightsResult<Tables> {
        let aggregator = TrendAggregator::new(&self.config.trend);
        let week_start = self.config.week_start;
        let events = self.member_events(inputs)?;
        let attributor = RevenueAttributor::new(&self.config.revenue, week_start);

        let streams = [
            ("space_revenue", space_revenue(inputs.space, week_start)),
            ("catering_revenue", self.catering_revenue(&attributor, inputs)),
            (
                "space_orders",
                periodize(
                    inputs.space.iter().filter_map(|b| Some((b.created_at?, 1.0))),
                    Granularity::Week,
                    week_start,
                ),
            ),
            (
                "catering_orders",
                periodize(
                    inputs
                        .catering
                        .iter()
                        .filter_map(|o| attributor.split_catering(o))
                        .filter_map(|split| Some((split.timestamp?, 1.0))),
                    Granularity::Week,
                    week_start,
                ),
            ),
            ("active_members", weekly_active_members(&events, week_start)),
        ];

        let mut tables = Tables::new();
        for (name, series) in streams {
            let rows = aggregator
                .compute(&series, self.config.trend.cutover_for(name))
                .iter()
                .map(|p| {
                    RowBuilder::new()
                        .period(&p.period)
                        .num("value", p.value)
                        .num("trailing", p.trailing)
                        .num("wow_pct", p.wow_pct)
                        .num("mom_pct", p.mom_pct)
                        .build()
                })
                .collect();
            tables.insert(name.to_string(), rows);
        }
        Ok(tables)
    }

    // ─── Operations ─────────────────────────────────────────────────────────

    fn operations_section(&self, inputs: &Inputs) -> InsightsResult<Tables> {
        let week_start = self.config.week_start;

        let finance: Vec<Row> = weekly_finance(inputs.space, week_start)
            .iter()
            .map(|w| {
                RowBuilder::new()
                    .period(&w.period)
                    .count("orders", w.orders)
                    .num("revenue", w.revenue)
                    .num("mean_order_value", w.mean_order_value)
                    .count("members", w.members)
                    .num("total_hours", w.total_hours)
                    .num("mean_hours", w.mean_hours)
                    .build()
            })
            .collect();

        let upgrades: Vec<Row> = monthly_upgrades(inputs.space, week_start)
            .iter()
            .map(|u| {
                RowBuilder::new()
                    .period(&u.period)
                    .count("upgraded_orders", u.upgraded_orders)
                    .num("upgraded_revenue", u.upgraded_revenue)
                    .count("regular_orders", u.regular_orders)
                    .num("regular_revenue", u.regular_revenue)
                    .build()
            })
            .collect();

        let usage: Vec<Row> = utilization(inputs.space, &self.config.utilization, week_start)
            .iter()
            .map(|u| {
                RowBuilder::new()
                    .period(&u.period)
                    .text("space_type", u.space_type.as_str())
                    .num("hours", u.hours)
                    .num("available_hours", u.available_hours)
                    .num("utilization_pct", u.utilization_pct)
                    .build()
            })
            .collect();

        let overtime: Vec<Row> = overtime_by_slot(inputs.space)
            .iter()
            .map(|o| {
                RowBuilder::new()
                    .text("space_type", o.space_type.as_str())
                    .count("start_hour", o.start_hour as usize)
                    .count("orders", o.orders)
                    .count("overtime_orders", o.overtime_orders)
                    .num("mean_paid", o.mean_paid)
                    .num("overtime_rate_pct", o.overtime_rate_pct)
                    .build()
            })
            .collect();

        let peaks: Vec<Row> = peak_hours(inputs.space)
            .iter()
            .map(|p| {
                RowBuilder::new()
                    .count("start_hour", p.start_hour as usize)
                    .count("orders", p.orders)
                    .num("revenue", p.revenue)
                    .num("order_share_pct", p.order_share_pct)
                    .num("revenue_share_pct", p.revenue_share_pct)
                    .build()
            })
            .collect();

        let purchases: Vec<Row> = first_vs_repeat(inputs.space)
            .iter()
            .map(|c| {
                RowBuilder::new()
                    .text("booking", if c.first_order { "first" } else { "repeat" })
                    .count("orders", c.orders)
                    .num("total_revenue", c.total_revenue)
                    .num("mean_revenue", c.mean_revenue)
                    .num("mean_hours", c.mean_hours)
                    .build()
            })
            .collect();

        let attributor = RevenueAttributor::new(&self.config.revenue, week_start);
        let group: Vec<Row> = group_revenue(
            &space_revenue(inputs.space, week_start),
            &self.catering_revenue(&attributor, inputs),
        )
        .iter()
        .map(|g| {
            RowBuilder::new()
                .period(&g.period)
                .num("space_revenue", g.space_revenue)
                .num("catering_revenue", g.catering_revenue)
                .build()
        })
        .collect();

        Ok(Tables::from([
            ("weekly_finance".to_string(), finance),
            ("upgrades".to_string(), upgrades),
            ("utilization".to_string(), usage),
            ("overtime".to_string(), overtime),
            ("peak_hours".to_string(), peaks),
            ("first_vs_repeat".to_string(), purchases),
            ("group_revenue".to_string(), group),
        ]))
    }
}

/// Start of the day after the latest event.
fn as_of(events: &[Event]) -> Option<NaiveDateTime> {
    let latest = events.iter().map(|e| e.timestamp).max()?;
    Some(Period::containing(latest, Granularity::Day, Weekday::Mon).end)
}

fn space_revenue(bookings: &[SpaceBooking], week_start: Weekday) -> Vec<(Period, f64)> {
    periodize(
        bookings.iter().filter_map(|b| Some((b.created_at?, b.paid_amount))),
        Granularity::Week,
        week_start,
    )
}

fn weekly_active_members(events: &[Event], week_start: Weekday) -> Vec<(Period, f64)> {
    let mut weeks: BTreeMap<Period, BTreeSet<_>> = BTreeMap::new();
    for event in events {
        if let Some(member) = &event.member {
            weeks
                .entry(Period::containing(event.timestamp, Granularity::Week, week_start))
                .or_default()
                .insert(member);
        }
    }
    weeks
        .into_iter()
        .map(|(period, members)| (period, members.len() as f64))
        .collect()
}

fn ledger_rows(entries: &[RevenueLedgerEntry]) -> Vec<Row> {
    entries
        .iter()
        .map(|e| {
            RowBuilder::new()
                .period(&e.period)
                .count("orders", e.orders)
                .num("gross", e.gross)
                .num("settlement", e.settlement)
                .num("welfare", e.welfare)
                .num("event_shoot", e.event_shoot)
                .num("event_named", e.event_named)
                .num("event_transferred", e.event_transferred)
                .num("core", e.core)
                .num("third_party", e.third_party)
                .num("takeaway", e.takeaway)
                .num("group_purchase", e.group_purchase)
                .build()
        })
        .collect()
}
