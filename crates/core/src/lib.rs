pub mod config;
pub mod error;
pub mod period;
pub mod types;

pub use config::AppConfig;
pub use error::{InsightsError, InsightsResult};
pub use period::{Granularity, Period};
pub use types::{Event, MemberId, SourceTables};
