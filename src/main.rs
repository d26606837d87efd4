use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

mod activity;
mod config;
mod db;
mod error;
mod formula;
mod ingest;
mod models;
mod pipeline;
mod ranker;
mod report;
mod telemetry;
mod window;

use crate::activity::ActivityMode;
use crate::config::{AppConfig, RankingConfig};
use crate::error::ConfigError;
use crate::formula::FormulaKind;
use crate::models::AdminId;

#[derive(Parser)]
#[command(name = "admin-lambda-ranking")]
#[command(about = "Rank admins by a composite lambda score over recent calls, chat ratings and leave", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import calls, chat ratings or leave requests from a CSV file
    Import {
        #[arg(long, value_enum)]
        kind: db::ImportKind,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank every admin and write CSV and JSON reports
    Rank {
        #[command(flatten)]
        ranking: RankingArgs,
        /// Rows shown in the console table
        #[arg(long, default_value_t = 10)]
        top_n: usize,
        /// Share of admins written to the top-performers file
        #[arg(long, default_value_t = report::DEFAULT_TOP_PERCENTILE)]
        percentile: u32,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Print the top N admins
    Top {
        n: usize,
        #[command(flatten)]
        ranking: RankingArgs,
    },
    /// Show the metrics and records behind one admin's score
    Analyze {
        admin_id: Uuid,
        #[command(flatten)]
        ranking: RankingArgs,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

/// Per-run overrides of the environment configuration.
#[derive(Args, Debug, Default)]
struct RankingArgs {
    /// raw-lambda or normalized-weighted
    #[arg(long)]
    formula: Option<FormulaKind>,
    /// Only rank admins with this many calls
    #[arg(long)]
    min_calls: Option<usize>,
    /// at-least or exactly
    #[arg(long)]
    min_calls_mode: Option<ActivityMode>,
    #[arg(long)]
    window_size: Option<usize>,
    #[arg(long)]
    leave_days: Option<i64>,
}

impl RankingArgs {
    fn apply(&self, base: &RankingConfig) -> Result<RankingConfig, ConfigError> {
        let mut ranking = base.clone();
        if let Some(formula) = self.formula {
            ranking.formula = formula;
        }
        if let Some(window_size) = self.window_size {
            ranking.window_size = window_size;
        }
        if let Some(leave_days) = self.leave_days {
            ranking.leave_window_days = leave_days;
        }
        if self.min_calls.is_some() || self.min_calls_mode.is_some() {
            ranking.min_activity = config::activity_threshold(
                self.min_calls.or(base.min_activity.map(|t| t.threshold)),
                self.min_calls_mode.or(base.min_activity.map(|t| t.mode)),
            )?;
        }
        ranking.validate()?;
        Ok(ranking)
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_outcome(pool: &PgPool, ranking: &RankingConfig) -> anyhow::Result<pipeline::RankingOutcome> {
    let taken_at = Utc::now();
    let leave_since = ranking.aggregator().leave_window_start(taken_at);
    let snapshot = db::fetch_snapshot(pool, taken_at, leave_since, None).await?;
    Ok(pipeline::run(snapshot, ranking))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("invalid configuration")?;
    telemetry::init(&config.log_level)?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { kind, csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, kind, &csv).await?;
            println!("Inserted {inserted} records from {}.", csv.display());
        }
        Commands::Rank {
            ranking,
            top_n,
            percentile,
            out_dir,
        } => {
            let ranking = ranking.apply(&config.ranking)?;
            let pool = connect().await?;
            let outcome = load_outcome(&pool, &ranking).await?;

            print!("{}", report::render_table(&outcome, top_n));
            if outcome.rankings.is_empty() {
                return Ok(());
            }

            let generated_at = Utc::now();
            let summary = report::build_report(&outcome, &ranking, generated_at);
            println!();
            print!("{}", report::render_insights(&summary.insights));

            let out_dir = out_dir.unwrap_or(config.output_dir);
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("failed to create {}", out_dir.display()))?;

            let csv_path = report::timestamped_path(&out_dir, "admin_rankings", "csv", generated_at);
            report::write_rankings_csv(&csv_path, &outcome.rankings)
                .with_context(|| format!("failed to write {}", csv_path.display()))?;

            let top = report::top_performers(&outcome.rankings, percentile);
            let top_path = report::timestamped_path(
                &out_dir,
                &format!("top_{percentile}_percent_admins"),
                "csv",
                generated_at,
            );
            report::write_rankings_csv(&top_path, top)
                .with_context(|| format!("failed to write {}", top_path.display()))?;

            let json_path = report::timestamped_path(&out_dir, "admin_ranking_report", "json", generated_at);
            report::write_json(&json_path, &summary)
                .with_context(|| format!("failed to write {}", json_path.display()))?;

            info!(admins = outcome.rankings.len(), issues = outcome.issues.len(), "ranking complete");
            println!();
            println!("Rankings written to {}.", csv_path.display());
            println!("Top {percentile}% ({} admins) written to {}.", top.len(), top_path.display());
            println!("Report written to {}.", json_path.display());
        }
        Commands::Top { n, ranking } => {
            let ranking = ranking.apply(&config.ranking)?;
            let pool = connect().await?;
            let outcome = load_outcome(&pool, &ranking).await?;
            print!("{}", report::render_table(&outcome, n));
        }
        Commands::Analyze {
            admin_id,
            ranking,
            out_dir,
        } => {
            let ranking = ranking.apply(&config.ranking)?;
            let pool = connect().await?;
            let taken_at = Utc::now();
            let leave_since = ranking.aggregator().leave_window_start(taken_at);
            let snapshot = db::fetch_snapshot(&pool, taken_at, leave_since, Some(admin_id)).await?;

            let Some(analysis) = pipeline::analyze(snapshot, &ranking, &AdminId::from(admin_id)) else {
                println!("No events recorded for admin {admin_id}.");
                return Ok(());
            };
            print!("{}", report::render_analysis(&analysis));

            let out_dir = out_dir.unwrap_or(config.output_dir);
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("failed to create {}", out_dir.display()))?;
            let path = report::timestamped_path(&out_dir, &format!("admin_{admin_id}_details"), "json", Utc::now());
            report::write_json(&path, &analysis)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Detailed analysis written to {}.", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityThreshold;

    #[test]
    fn cli_overrides_take_precedence() {
        let args = RankingArgs {
            formula: Some(FormulaKind::NormalizedWeighted),
            window_size: Some(20),
            ..RankingArgs::default()
        };
        let ranking = args.apply(&RankingConfig::default()).unwrap();
        assert_eq!(ranking.formula, FormulaKind::NormalizedWeighted);
        assert_eq!(ranking.window_size, 20);
        assert_eq!(ranking.leave_window_days, 30);
    }

    #[test]
    fn mode_override_keeps_configured_threshold() {
        let base = RankingConfig {
            min_activity: Some(ActivityThreshold {
                threshold: 10,
                mode: ActivityMode::AtLeast,
            }),
            ..RankingConfig::default()
        };
        let args = RankingArgs {
            min_calls_mode: Some(ActivityMode::Exactly),
            ..RankingArgs::default()
        };
        let ranking = args.apply(&base).unwrap();
        assert_eq!(
            ranking.min_activity,
            Some(ActivityThreshold {
                threshold: 10,
                mode: ActivityMode::Exactly
            })
        );
    }

    #[test]
    fn mode_without_any_threshold_is_rejected() {
        let args = RankingArgs {
            min_calls_mode: Some(ActivityMode::Exactly),
            ..RankingArgs::default()
        };
        assert!(args.apply(&RankingConfig::default()).is_err());
    }

    #[test]
    fn cli_parses_rank_flags() {
        let cli = Cli::try_parse_from([
            "admin-lambda-ranking",
            "rank",
            "--formula",
            "normalized-weighted",
            "--min-calls",
            "10",
            "--min-calls-mode",
            "exactly",
        ])
        .unwrap();
        match cli.command {
            Commands::Rank { ranking, top_n, .. } => {
                assert_eq!(ranking.formula, Some(FormulaKind::NormalizedWeighted));
                assert_eq!(ranking.min_calls, Some(10));
                assert_eq!(ranking.min_calls_mode, Some(ActivityMode::Exactly));
                assert_eq!(top_n, 10);
            }
            _ => panic!("expected rank command"),
        }
    }
}
