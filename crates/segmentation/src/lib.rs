//! Member value segmentation: decay-weighted RFM scoring, score
//! distributions, and order-count / membership-tier breakdowns.

pub mod distribution;
pub mod rfm;
pub mod tiers;

pub use distribution::{score_distribution, DistributionRow};
pub use rfm::{RfmRecord, RfmReport, RfmScorer};
pub use tiers::{membership_tiers, order_tiers, MembershipTierRow, OrderTier, OrderTierRow};
