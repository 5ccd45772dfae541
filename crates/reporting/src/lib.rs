//! Insights reporting: trend aggregation, operational summaries and the
//! engine that composes every analysis into one report document.

pub mod document;
pub mod engine;
pub mod operations;
pub mod trend;

pub use document::{EngineOutcome, ReportDocument, Row, Section};
pub use engine::InsightsEngine;
pub use trend::{periodize, TrendAggregator, TrendPoint};
