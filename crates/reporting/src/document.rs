//! The report document handed to the presentation layer: category →
//! table name → rows of scalar columns.

use chrono::{DateTime, Utc};
use insights_core::{InsightsError, InsightsResult, Period};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub type Row = serde_json::Map<String, Value>;
pub type Tables = BTreeMap<String, Vec<Row>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&InsightsError> for ErrorBody {
    fn from(err: &InsightsError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// A category's tables, or the marker left by a module that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Section {
    Tables(Tables),
    Failed { error: ErrorBody },
}

impl Section {
    pub fn failed(err: &InsightsError) -> Self {
        Self::Failed { error: err.into() }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn table(&self, name: &str) -> Option<&[Row]> {
        match self {
            Self::Tables(tables) => tables.get(name).map(Vec::as_slice),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDocument {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub sections: BTreeMap<String, Section>,
}

impl ReportDocument {
    pub fn new(sections: BTreeMap<String, Section>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            sections,
        }
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn to_json_pretty(&self) -> InsightsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Result of one engine invocation: the full document or a single error,
/// never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineOutcome {
    Report(ReportDocument),
    Error { error: ErrorBody },
}

impl From<InsightsResult<ReportDocument>> for EngineOutcome {
    fn from(result: InsightsResult<ReportDocument>) -> Self {
        match result {
            Ok(doc) => Self::Report(doc),
            Err(err) => Self::Error {
                error: (&err).into(),
            },
        }
    }
}

impl EngineOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Builds one row column by column. Non-finite numbers become null.
#[derive(Debug, Default)]
pub struct RowBuilder {
    row: Row,
}

impl RowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `period` label plus the ISO start date for sorting.
    pub fn period(self, period: &Period) -> Self {
        self.text("period", period.label())
            .text("period_start", period.start_date().to_string())
    }

    pub fn text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.row.insert(key.to_string(), Value::String(value.into()));
        self
    }

    pub fn count(mut self, key: &str, value: usize) -> Self {
        self.row.insert(key.to_string(), Value::from(value));
        self
    }

    pub fn int(mut self, key: &str, value: i64) -> Self {
        self.row.insert(key.to_string(), Value::from(value));
        self
    }

    pub fn num(mut self, key: &str, value: f64) -> Self {
        let value = serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.row.insert(key.to_string(), value);
        self
    }

    pub fn opt_text(mut self, key: &str, value: Option<String>) -> Self {
        self.row
            .insert(key.to_string(), value.map_or(Value::Null, Value::String));
        self
    }

    pub fn build(self) -> Row {
        self.row
    }
}
