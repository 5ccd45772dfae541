//! Population counts of the RFM indices over unit-width bins on `[0, bins)`.

use serde::{Deserialize, Serialize};

use crate::rfm::RfmRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub bin: usize,
    pub value_score: usize,
    pub recency_index: usize,
    pub monetary_index: usize,
    pub frequency_index: usize,
}

/// One row per bin, all four indices aligned on the bin column. Values at
/// or above the top edge (an index of exactly 100) fall in the last bin.
pub fn score_distribution(records: &[RfmRecord], bins: usize) -> Vec<DistributionRow> {
    let mut rows: Vec<DistributionRow> = (0..bins)
        .map(|bin| DistributionRow {
            bin,
            value_score: 0,
            recency_index: 0,
            monetary_index: 0,
            frequency_index: 0,
        })
        .collect();
    if bins == 0 {
        return rows;
    }

    for record in records {
        rows[bin_of(record.value_score, bins)].value_score += 1;
        rows[bin_of(record.recency_index, bins)].recency_index += 1;
        rows[bin_of(record.monetary_index, bins)].monetary_index += 1;
        rows[bin_of(record.frequency_index, bins)].frequency_index += 1;
    }
    rows
}

fn bin_of(value: f64, bins: usize) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value.floor() as usize).min(bins - 1)
}
