//! Recency / frequency / monetary scoring over a trailing lookback window.
//!
//! recency_index   = exp(-λ · recency_days) × 100
//! monetary_index  = ln(spend + 1) / max_population(ln(spend + 1)) × 100
//! frequency_index = ln(orders + 1) / max_population(ln(orders + 1)) × 100
//! value_score     = recency_index × (w · monetary_index + (1 − w) · frequency_index) / 100

use chrono::{Duration, NaiveDateTime};
use insights_core::config::RfmConfig;
use insights_core::period::fractional_days;
use insights_core::{Event, MemberId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmRecord {
    pub member: MemberId,
    pub last_order: NaiveDateTime,
    pub total_spend: f64,
    pub order_count: usize,
    pub recency_days: f64,
    pub recency_index: f64,
    pub monetary_raw: f64,
    pub monetary_index: f64,
    pub frequency_raw: f64,
    pub frequency_index: f64,
    pub value_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RfmReport {
    /// Latest member order observed; the scoring reference point.
    pub now: Option<NaiveDateTime>,
    pub records: Vec<RfmRecord>,
}

#[derive(Default)]
struct Aggregate {
    last_order: Option<NaiveDateTime>,
    total_spend: f64,
    order_count: usize,
}

pub struct RfmScorer {
    config: RfmConfig,
}

impl RfmScorer {
    pub fn new(config: &RfmConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn recency_index(&self, recency_days: f64) -> f64 {
        (-self.config.decay_lambda * recency_days).exp() * 100.0
    }

    pub fn score(&self, events: &[Event]) -> RfmReport {
        let Some(now) = events
            .iter()
            .filter(|e| e.member.is_some())
            .map(|e| e.timestamp)
            .max()
        else {
            return RfmReport::default();
        };
        let window_start = now - Duration::days(self.config.lookback_days as i64);

        let mut aggregates: BTreeMap<&MemberId, Aggregate> = BTreeMap::new();
        for event in events.iter().filter(|e| e.timestamp >= window_start) {
            let Some(member) = &event.member else {
                continue;
            };
            let agg = aggregates.entry(member).or_default();
            agg.total_spend += event.amount;
            agg.order_count += 1;
            agg.last_order = agg.last_order.max(Some(event.timestamp));
        }

        let members: Vec<(&MemberId, NaiveDateTime, f64, usize)> = aggregates
            .into_iter()
            .filter_map(|(id, agg)| Some((id, agg.last_order?, agg.total_spend, agg.order_count)))
            .collect();

        let monetary_raw: Vec<f64> = members
            .iter()
            .map(|(_, _, spend, _)| (spend.max(0.0) + 1.0).ln())
            .collect();
        let frequency_raw: Vec<f64> = members
            .iter()
            .map(|(_, _, _, orders)| (*orders as f64 + 1.0).ln())
            .collect();
        let monetary_index = relative_index(&monetary_raw);
        let frequency_index = relative_index(&frequency_raw);
        let w = self.config.monetary_weight;

        let records: Vec<RfmRecord> = members
            .iter()
            .enumerate()
            .map(|(i, (id, last_order, spend, orders))| {
                let recency_days = fractional_days(*last_order, now);
                let recency_index = self.recency_index(recency_days);
                let blended = w * monetary_index[i] + (1.0 - w) * frequency_index[i];
                RfmRecord {
                    member: (*id).clone(),
                    last_order: *last_order,
                    total_spend: *spend,
                    order_count: *orders,
                    recency_days,
                    recency_index,
                    monetary_raw: monetary_raw[i],
                    monetary_index: monetary_index[i],
                    frequency_raw: frequency_raw[i],
                    frequency_index: frequency_index[i],
                    value_score: recency_index * blended / 100.0,
                }
            })
            .collect();

        info!(
            members = records.len(),
            lookback_days = self.config.lookback_days,
            lambda = self.config.decay_lambda,
            weight = w,
            "RFM scores computed"
        );
        RfmReport {
            now: Some(now),
            records,
        }
    }
}

/// Each value as a percentage of the population maximum. A population with
/// a single distinct value (or a zero maximum) scores 0 throughout.
fn relative_index(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
    if raw.is_empty() || max <= 0.0 || max == min {
        debug!(population = raw.len(), "Degenerate index population, using 0");
        return vec![0.0; raw.len()];
    }
    raw.iter().map(|v| v / max * 100.0).collect()
}
