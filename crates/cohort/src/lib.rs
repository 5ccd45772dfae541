//! Customer lifecycle cohorts: active windows, churn-warning bands,
//! reactivation, new and repurchasing members per period.

pub mod engine;
pub mod history;
pub mod intervals;
pub mod lifecycle;

pub use engine::{CohortEngine, CohortSnapshot};
pub use history::MemberHistories;
pub use lifecycle::{LifecycleThresholds, MemberState};
