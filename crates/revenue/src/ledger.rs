//! Per-record category splits and their per-period ledger rows.

use chrono::NaiveDateTime;
use insights_core::{InsightsError, InsightsResult, Period};
use serde::{Deserialize, Serialize};

use crate::rules::SlotRule;

/// One space booking split into mutually exclusive categories.
/// `third_party` is a breakdown of money already inside `core`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceSplit {
    pub order_id: String,
    pub timestamp: Option<NaiveDateTime>,
    pub gross: f64,
    pub settlement: f64,
    pub welfare: f64,
    pub event_shoot: f64,
    pub event_named: f64,
    pub core: f64,
    pub third_party: f64,
    pub applied: Vec<SlotRule>,
}

impl SpaceSplit {
    pub fn event(&self) -> f64 {
        self.event_shoot + self.event_named
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CateringSplit {
    pub order_id: String,
    pub timestamp: Option<NaiveDateTime>,
    pub gross: f64,
    /// Event orders whose revenue is reported on the space side.
    pub event_transferred: f64,
    pub core: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ledger {
    Space,
    Catering,
}

/// Gross receipts of one period and their attribution. The exclusive
/// categories are `settlement`, `welfare`, `event_shoot`, `event_named`,
/// `event_transferred` and `core`; `third_party`, `takeaway` and
/// `group_purchase` are memo breakdowns of `core`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueLedgerEntry {
    pub ledger: Ledger,
    pub period: Period,
    pub orders: usize,
    pub gross: f64,
    pub settlement: f64,
    pub welfare: f64,
    pub event_shoot: f64,
    pub event_named: f64,
    pub event_transferred: f64,
    pub core: f64,
    pub third_party: f64,
    pub takeaway: f64,
    pub group_purchase: f64,
}

impl RevenueLedgerEntry {
    pub fn new(ledger: Ledger, period: Period) -> Self {
        Self {
            ledger,
            period,
            orders: 0,
            gross: 0.0,
            settlement: 0.0,
            welfare: 0.0,
            event_shoot: 0.0,
            event_named: 0.0,
            event_transferred: 0.0,
            core: 0.0,
            third_party: 0.0,
            takeaway: 0.0,
            group_purchase: 0.0,
        }
    }

    pub fn add_space(&mut self, split: &SpaceSplit) {
        self.orders += 1;
        self.gross += split.gross;
        self.settlement += split.settlement;
        self.welfare += split.welfare;
        self.event_shoot += split.event_shoot;
        self.event_named += split.event_named;
        self.core += split.core;
        self.third_party += split.third_party;
    }

    pub fn add_catering(&mut self, split: &CateringSplit) {
        self.orders += 1;
        self.gross += split.gross;
        self.event_transferred += split.event_transferred;
        self.core += split.core;
    }

    /// External feed revenue counts as gross and lands in core.
    pub fn add_supplement(&mut self, takeaway: f64, group_purchase: f64) {
        self.gross += takeaway + group_purchase;
        self.core += takeaway + group_purchase;
        self.takeaway += takeaway;
        self.group_purchase += group_purchase;
    }

    pub fn attributed(&self) -> f64 {
        self.settlement
            + self.welfare
            + self.event_shoot
            + self.event_named
            + self.event_transferred
            + self.core
    }

    /// `gross == attributed()` within `tolerance` relative to gross (absolute
    /// below one currency unit).
    pub fn check_balance(&self, tolerance: f64) -> InsightsResult<()> {
        let attributed = self.attributed();
        let scale = self.gross.abs().max(1.0);
        if (self.gross - attributed).abs() <= tolerance * scale {
            Ok(())
        } else {
            Err(InsightsError::Reconciliation {
                period: self.period.label(),
                gross: self.gross,
                attributed,
            })
        }
    }
}
