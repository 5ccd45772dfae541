//! Insights engine: batch analytics over the space and catering ledgers.
//!
//! Reads the prepared source tables as one JSON document, runs every
//! analysis module, and writes the report document (or a structured error).

use anyhow::Context;
use chrono::Weekday;
use clap::Parser;
use insights_core::{AppConfig, SourceTables};
use insights_reporting::{EngineOutcome, InsightsEngine};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "insights-engine")]
#[command(about = "Cohort, RFM, revenue attribution and trend reports for a hospitality operation")]
#[command(version)]
struct Cli {
    /// Source tables as JSON (`space`, `catering`, `members`, `supplement`)
    #[arg(long, env = "INSIGHTS__INPUT")]
    input: PathBuf,

    /// Report destination; stdout when omitted
    #[arg(long, env = "INSIGHTS__OUTPUT")]
    output: Option<PathBuf>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "INSIGHTS__CONFIG")]
    config: Option<String>,

    /// First day of the reporting week (overrides config)
    #[arg(long)]
    week_start: Option<Weekday>,

    /// RFM recency decay per day (overrides config)
    #[arg(long)]
    decay_lambda: Option<f64>,

    /// RFM monetary weight (overrides config)
    #[arg(long)]
    monetary_weight: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "insights_engine=info,insights_reporting=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(week_start) = cli.week_start {
        config.week_start = week_start;
    }
    if let Some(lambda) = cli.decay_lambda {
        config.rfm.decay_lambda = lambda;
    }
    if let Some(weight) = cli.monetary_weight {
        config.rfm.monetary_weight = weight;
    }
    config.validate()?;

    info!(
        input = %cli.input.display(),
        week_start = %config.week_start,
        lookback_days = config.rfm.lookback_days,
        "Configuration loaded"
    );

    let raw = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let tables: SourceTables =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", cli.input.display()))?;

    let engine = InsightsEngine::new(config);
    let outcome = EngineOutcome::from(engine.run(&tables));
    let failed = outcome.is_error();
    let body = serde_json::to_string_pretty(&outcome)?;

    match &cli.output {
        Some(path) => {
            fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
            info!(output = %path.display(), "Report written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(body.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }

    if failed {
        error!("Run aborted, structured error written");
        std::process::exit(2);
    }
    Ok(())
}
