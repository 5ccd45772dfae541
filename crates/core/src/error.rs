use thiserror::Error;

pub type InsightsResult<T> = Result<T, InsightsError>;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Data error in `{table}`: {detail}")]
    Data { table: String, detail: String },

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Upstream table unavailable: {0}")]
    Upstream(String),

    #[error("Reconciliation imbalance for {period}: gross {gross:.6} != attributed {attributed:.6}")]
    Reconciliation {
        period: String,
        gross: f64,
        attributed: f64,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl InsightsError {
    pub fn data(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Data {
            table: table.into(),
            detail: detail.into(),
        }
    }

    /// Stable discriminator used in structured error output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data { .. } => "data_error",
            Self::Computation(_) => "computation_error",
            Self::Upstream(_) => "upstream_error",
            Self::Reconciliation { .. } => "reconciliation_error",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Io(_) => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Upstream failures abort a whole run; everything else stays inside
    /// the module that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_discriminators() {
        assert_eq!(InsightsError::data("space", "x").kind(), "data_error");
        assert_eq!(InsightsError::Upstream("space".into()).kind(), "upstream_error");
        assert!(InsightsError::Upstream("space".into()).is_fatal());
        assert!(!InsightsError::Computation("div".into()).is_fatal());
    }

    #[test]
    fn test_reconciliation_message() {
        let err = InsightsError::Reconciliation {
            period: "2024-03".into(),
            gross: 10.0,
            attributed: 9.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("2024-03"));
        assert!(msg.contains("10.000000"));
    }
}
