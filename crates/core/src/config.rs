use chrono::{NaiveDate, Weekday};
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{InsightsError, InsightsResult};
use crate::period::Granularity;

/// Root engine configuration. Loaded from an optional TOML file and then
/// environment variables with the prefix `INSIGHTS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_week_start")]
    pub week_start: Weekday,
    #[serde(default)]
    pub cohort: CohortConfig,
    #[serde(default)]
    pub rfm: RfmConfig,
    #[serde(default)]
    pub revenue: RevenueConfig,
    #[serde(default)]
    pub trend: TrendConfig,
    #[serde(default)]
    pub members: MembersConfig,
    #[serde(default)]
    pub utilization: UtilizationConfig,
}

fn default_week_start() -> Weekday {
    Weekday::Mon
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            week_start: default_week_start(),
            cohort: CohortConfig::default(),
            rfm: RfmConfig::default(),
            revenue: RevenueConfig::default(),
            trend: TrendConfig::default(),
            members: MembersConfig::default(),
            utilization: UtilizationConfig::default(),
        }
    }
}

// ─── Cohort Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CohortConfig {
    #[serde(default = "default_cohort_granularity")]
    pub granularity: Granularity,
    #[serde(default = "default_active_windows_days")]
    pub active_windows_days: Vec<u32>,
    #[serde(default = "default_churn_band_edges_days")]
    pub churn_band_edges_days: Vec<u32>,
    #[serde(default = "default_reactivation_min_days")]
    pub reactivation_min_days: u32,
    #[serde(default = "default_reactivation_max_days")]
    pub reactivation_max_days: u32,
}

fn default_cohort_granularity() -> Granularity {
    Granularity::Month
}
fn default_active_windows_days() -> Vec<u32> {
    vec![30, 60, 90]
}
fn default_churn_band_edges_days() -> Vec<u32> {
    vec![30, 60, 90, 120]
}
fn default_reactivation_min_days() -> u32 {
    90
}
fn default_reactivation_max_days() -> u32 {
    180
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            granularity: default_cohort_granularity(),
            active_windows_days: default_active_windows_days(),
            churn_band_edges_days: default_churn_band_edges_days(),
            reactivation_min_days: default_reactivation_min_days(),
            reactivation_max_days: default_reactivation_max_days(),
        }
    }
}

// ─── RFM Config ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RfmConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Recency decay per day. 0.0115 halves the index after ~60 days;
    /// 0.015 was used by an earlier revision.
    #[serde(default = "default_decay_lambda")]
    pub decay_lambda: f64,
    /// Share of the monetary index in the composite score; the remainder
    /// goes to frequency. 0.4 was used by an earlier revision.
    #[serde(default = "default_monetary_weight")]
    pub monetary_weight: f64,
    #[serde(default = "default_bins")]
    pub bins: usize,
}

fn default_lookback_days() -> u32 {
    180
}
fn default_decay_lambda() -> f64 {
    0.0115
}
fn default_monetary_weight() -> f64 {
    0.6
}
fn default_bins() -> usize {
    100
}

impl Default for RfmConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            decay_lambda: default_decay_lambda(),
            monetary_weight: default_monetary_weight(),
            bins: default_bins(),
        }
    }
}

// ─── Revenue Config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RevenueConfig {
    /// Raw payment codes to canonical method names
    /// (`platform_native`, `welfare_credit`, `monthly_settlement`,
    /// `third_party_review_site`). Codes not listed are kept as-is.
    #[serde(default = "default_payment_aliases")]
    pub payment_aliases: HashMap<String, String>,
    #[serde(default = "default_shoot_keywords")]
    pub shoot_keywords: Vec<String>,
    #[serde(default = "default_named_event_keywords")]
    pub named_event_keywords: Vec<String>,
    #[serde(default = "default_deposit_keywords")]
    pub deposit_keywords: Vec<String>,
    #[serde(default = "default_excluded_service_types")]
    pub excluded_service_types: Vec<String>,
    /// Relative tolerance of the gross = sum(categories) check.
    #[serde(default = "default_balance_tolerance")]
    pub balance_tolerance: f64,
}

fn default_payment_aliases() -> HashMap<String, String> {
    [
        ("微信支付", "platform_native"),
        ("微信", "platform_native"),
        ("小程序支付", "platform_native"),
        ("储值余额", "platform_native"),
        ("wechat_pay", "platform_native"),
        ("balance", "platform_native"),
        ("福利卡", "welfare_credit"),
        ("福利积分", "welfare_credit"),
        ("welfare", "welfare_credit"),
        ("月结", "monthly_settlement"),
        ("企业月结", "monthly_settlement"),
        ("monthly", "monthly_settlement"),
        ("美团", "third_party_review_site"),
        ("大众点评", "third_party_review_site"),
        ("点评", "third_party_review_site"),
        ("meituan", "third_party_review_site"),
        ("dianping", "third_party_review_site"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_shoot_keywords() -> Vec<String> {
    vec!["拍摄".into(), "shoot".into()]
}

fn default_named_event_keywords() -> Vec<String> {
    vec!["活动".into(), "沙龙".into(), "event".into()]
}

fn default_deposit_keywords() -> Vec<String> {
    vec!["定金".into(), "尾款".into(), "deposit".into(), "final payment".into()]
}

fn default_excluded_service_types() -> Vec<String> {
    vec!["不计收入".into(), "报损".into(), "non_chargeable".into(), "write_off".into()]
}

fn default_balance_tolerance() -> f64 {
    1e-6
}

impl Default for RevenueConfig {
    fn default() -> Self {
        Self {
            payment_aliases: default_payment_aliases(),
            shoot_keywords: default_shoot_keywords(),
            named_event_keywords: default_named_event_keywords(),
            deposit_keywords: default_deposit_keywords(),
            excluded_service_types: default_excluded_service_types(),
            balance_tolerance: default_balance_tolerance(),
        }
    }
}

// ─── Trend Config ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TrendConfig {
    #[serde(default = "default_trend_window")]
    pub window: usize,
    #[serde(default = "default_month_lag")]
    pub month_lag: usize,
    /// Metric stream name to backfill boundary; deltas of periods starting
    /// on or before the date are reported as 0.
    #[serde(default)]
    pub cutovers: HashMap<String, NaiveDate>,
}

fn default_trend_window() -> usize {
    4
}
fn default_month_lag() -> usize {
    4
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window: default_trend_window(),
            month_lag: default_month_lag(),
            cutovers: HashMap::new(),
        }
    }
}

impl TrendConfig {
    pub fn cutover_for(&self, stream: &str) -> Option<NaiveDate> {
        self.cutovers.get(stream).copied()
    }
}

// ─── Members Config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MembersConfig {
    #[serde(default = "default_excluded_tiers")]
    pub excluded_tiers: Vec<i32>,
}

fn default_excluded_tiers() -> Vec<i32> {
    vec![0]
}

impl Default for MembersConfig {
    fn default() -> Self {
        Self {
            excluded_tiers: default_excluded_tiers(),
        }
    }
}

// ─── Utilization Config ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct UtilizationConfig {
    #[serde(default = "default_pod_keyword")]
    pub pod_keyword: String,
    #[serde(default = "default_pod_daily_hours")]
    pub pod_daily_hours: f64,
    #[serde(default = "default_daily_hours")]
    pub default_daily_hours: f64,
}

fn default_pod_keyword() -> String {
    "心流舱".to_string()
}
fn default_pod_daily_hours() -> f64 {
    17.0
}
fn default_daily_hours() -> f64 {
    11.0
}

impl Default for UtilizationConfig {
    fn default() -> Self {
        Self {
            pod_keyword: default_pod_keyword(),
            pod_daily_hours: default_pod_daily_hours(),
            default_daily_hours: default_daily_hours(),
        }
    }
}

impl UtilizationConfig {
    pub fn daily_hours_for(&self, space_type: &str) -> f64 {
        if space_type.contains(&self.pod_keyword) {
            self.pod_daily_hours
        } else {
            self.default_daily_hours
        }
    }
}

/// Settings given as comma-separated lists in environment variables. Every
/// other variable is read as a single value.
const LIST_KEYS: [&str; 7] = [
    "cohort.active_windows_days",
    "cohort.churn_band_edges_days",
    "revenue.shoot_keywords",
    "revenue.named_event_keywords",
    "revenue.deposit_keywords",
    "revenue.excluded_service_types",
    "members.excluded_tiers",
];

impl AppConfig {
    /// Load configuration from an optional file and environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let mut env = config::Environment::with_prefix("INSIGHTS")
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }
        let builder = builder.add_source(env);

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn validate(&self) -> InsightsResult<()> {
        let rfm = &self.rfm;
        if !(rfm.decay_lambda.is_finite() && rfm.decay_lambda > 0.0) {
            return Err(InsightsError::Config(format!(
                "rfm.decay_lambda must be positive, got {}",
                rfm.decay_lambda
            )));
        }
        if !(0.0..=1.0).contains(&rfm.monetary_weight) {
            return Err(InsightsError::Config(format!(
                "rfm.monetary_weight must lie in [0, 1], got {}",
                rfm.monetary_weight
            )));
        }
        if rfm.bins == 0 || rfm.lookback_days == 0 {
            return Err(InsightsError::Config(
                "rfm.bins and rfm.lookback_days must be non-zero".into(),
            ));
        }

        let cohort = &self.cohort;
        if cohort.active_windows_days.is_empty() || cohort.active_windows_days.contains(&0) {
            return Err(InsightsError::Config(
                "cohort.active_windows_days must be non-empty and non-zero".into(),
            ));
        }
        if cohort.churn_band_edges_days.len() < 2
            || cohort.churn_band_edges_days.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(InsightsError::Config(
                "cohort.churn_band_edges_days needs at least two strictly increasing edges".into(),
            ));
        }
        if cohort.reactivation_min_days > cohort.reactivation_max_days {
            return Err(InsightsError::Config(
                "cohort.reactivation_min_days exceeds reactivation_max_days".into(),
            ));
        }

        if self.trend.window == 0 || self.trend.month_lag == 0 {
            return Err(InsightsError::Config(
                "trend.window and trend.month_lag must be non-zero".into(),
            ));
        }
        if !(self.revenue.balance_tolerance.is_finite() && self.revenue.balance_tolerance >= 0.0) {
            return Err(InsightsError::Config(
                "revenue.balance_tolerance must be a non-negative number".into(),
            ));
        }
        if self.utilization.pod_daily_hours <= 0.0 || self.utilization.default_daily_hours <= 0.0 {
            return Err(InsightsError::Config(
                "utilization daily hours must be positive".into(),
            ));
        }
        Ok(())
    }
}
