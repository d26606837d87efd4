use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::activity::ActivityThreshold;
use crate::config::RankingConfig;
use crate::error::DataIssue;
use crate::models::{AdminScore, ScoreTerms};
use crate::pipeline::{AdminAnalysis, RankingOutcome};

pub const DEFAULT_TOP_PERCENTILE: u32 = 20;

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation; undefined below two values.
fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub avg_score: Option<f64>,
    pub max_score: Option<f64>,
    pub min_score: Option<f64>,
    pub std_score: Option<f64>,
    pub avg_cr50: Option<f64>,
    pub avg_delivery_term: Option<f64>,
    pub avg_r50: Option<f64>,
    pub avg_leave_term: Option<f64>,
}

pub fn summarize(rankings: &[AdminScore]) -> SummaryStatistics {
    let scores: Vec<f64> = rankings.iter().map(|s| s.score).collect();
    let column = |f: fn(&AdminScore) -> f64| -> Vec<f64> { rankings.iter().map(f).collect() };

    SummaryStatistics {
        avg_score: mean(&scores),
        max_score: scores.iter().copied().reduce(f64::max),
        min_score: scores.iter().copied().reduce(f64::min),
        std_score: std_dev(&scores),
        avg_cr50: mean(&column(|s| s.raw_metrics.cr50)),
        avg_delivery_term: mean(&column(|s| s.terms.delivery)),
        avg_r50: mean(&column(|s| s.raw_metrics.r50)),
        avg_leave_term: mean(&column(|s| s.terms.leave)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceDistribution {
    pub excellent: usize,
    pub good: usize,
    pub average: usize,
    pub below_average: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComponentLeaders {
    pub strongest_in_call_rating: Option<String>,
    pub fastest_delivery: Option<String>,
    pub best_chat_rating: Option<String>,
    pub highest_availability: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImprovementOpportunities {
    pub low_call_ratings: Vec<String>,
    pub slow_delivery: Vec<String>,
    pub low_chat_ratings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Insights {
    pub performance_distribution: PerformanceDistribution,
    pub component_analysis: ComponentLeaders,
    pub improvement_opportunities: ImprovementOpportunities,
}

pub fn insights(rankings: &[AdminScore]) -> Insights {
    if rankings.is_empty() {
        return Insights::default();
    }

    let scores: Vec<f64> = rankings.iter().map(|s| s.score).collect();
    let band = |q: f64| quantile(&scores, q).unwrap_or(0.0);
    let (q40, q60, q80) = (band(0.4), band(0.6), band(0.8));

    let mut distribution = PerformanceDistribution::default();
    for score in &scores {
        match *score {
            s if s >= q80 => distribution.excellent += 1,
            s if s >= q60 => distribution.good += 1,
            s if s >= q40 => distribution.average += 1,
            _ => distribution.below_average += 1,
        }
    }

    Insights {
        performance_distribution: distribution,
        component_analysis: ComponentLeaders {
            strongest_in_call_rating: leader(rankings, |s| s.raw_metrics.cr50),
            fastest_delivery: leader(rankings, |s| s.terms.delivery),
            best_chat_rating: leader(rankings, |s| s.raw_metrics.r50),
            highest_availability: leader(rankings, |s| s.terms.leave),
        },
        improvement_opportunities: ImprovementOpportunities {
            low_call_ratings: laggards(rankings, |s| s.raw_metrics.cr50),
            slow_delivery: laggards(rankings, |s| s.terms.delivery),
            low_chat_ratings: laggards(rankings, |s| s.raw_metrics.r50),
        },
    }
}

/// First admin in rank order holding the maximum of `metric`.
fn leader(rankings: &[AdminScore], metric: impl Fn(&AdminScore) -> f64) -> Option<String> {
    let mut best: Option<&AdminScore> = None;
    for score in rankings {
        if best.map_or(true, |b| metric(score) > metric(b)) {
            best = Some(score);
        }
    }
    best.map(|s| s.admin_name.clone())
}

/// Admins below the 30th percentile of `metric`, in rank order.
fn laggards(rankings: &[AdminScore], metric: impl Fn(&AdminScore) -> f64) -> Vec<String> {
    let values: Vec<f64> = rankings.iter().map(&metric).collect();
    let Some(cutoff) = quantile(&values, 0.3) else {
        return Vec::new();
    };
    rankings
        .iter()
        .filter(|s| metric(s) < cutoff)
        .map(|s| s.admin_name.clone())
        .collect()
}

/// The best `percentile` percent, never fewer than one admin.
pub fn top_performers(rankings: &[AdminScore], percentile: u32) -> &[AdminScore] {
    if rankings.is_empty() {
        return rankings;
    }
    let count = (rankings.len() * percentile.min(100) as usize) / 100;
    &rankings[..count.max(1)]
}

#[derive(Debug, Serialize)]
struct RankingRow<'a> {
    rank: usize,
    admin_id: &'a str,
    admin_name: &'a str,
    score: f64,
    cr50: f64,
    cdt50: f64,
    r50: f64,
    lr1m: u32,
    call_rating_term: f64,
    delivery_term: f64,
    chat_rating_term: f64,
    leave_term: f64,
    cr_norm: Option<f64>,
    r_norm: Option<f64>,
    cdt_norm: Option<f64>,
    lr_norm: Option<f64>,
}

impl<'a> From<&'a AdminScore> for RankingRow<'a> {
    fn from(score: &'a AdminScore) -> Self {
        let metrics = &score.raw_metrics;
        let normalized = score.normalized_metrics;
        Self {
            rank: score.rank,
            admin_id: score.admin_id.as_str(),
            admin_name: &score.admin_name,
            score: round3(score.score),
            cr50: round3(metrics.cr50),
            cdt50: round3(metrics.cdt50),
            r50: round3(metrics.r50),
            lr1m: metrics.lr1m,
            call_rating_term: round3(score.terms.call_rating),
            delivery_term: round3(score.terms.delivery),
            chat_rating_term: round3(score.terms.chat_rating),
            leave_term: round3(score.terms.leave),
            cr_norm: normalized.map(|n| round3(n.cr_norm)),
            r_norm: normalized.map(|n| round3(n.r_norm)),
            cdt_norm: normalized.map(|n| round3(n.cdt_norm)),
            lr_norm: normalized.map(|n| round3(n.lr_norm)),
        }
    }
}

pub fn write_rankings<W: std::io::Write>(writer: W, rankings: &[AdminScore]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for score in rankings {
        csv.serialize(RankingRow::from(score))?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_rankings_csv(path: &Path, rankings: &[AdminScore]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    write_rankings(file, rankings)
}

#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub snapshot_taken_at: DateTime<Utc>,
    pub formula: String,
    pub formula_expression: String,
    pub window_size: usize,
    pub leave_window_days: i64,
    pub activity_threshold: Option<ActivityThreshold>,
    pub total_admins: usize,
    pub excluded_by_activity: usize,
}

#[derive(Debug, Serialize)]
pub struct RankingReport<'a> {
    pub metadata: ReportMetadata,
    pub summary_statistics: SummaryStatistics,
    pub insights: Insights,
    pub data_issues: &'a [DataIssue],
    pub rankings: &'a [AdminScore],
}

pub fn build_report<'a>(
    outcome: &'a RankingOutcome,
    config: &RankingConfig,
    generated_at: DateTime<Utc>,
) -> RankingReport<'a> {
    RankingReport {
        metadata: ReportMetadata {
            generated_at,
            snapshot_taken_at: outcome.taken_at,
            formula: outcome.formula_name.to_string(),
            formula_expression: outcome.formula_expression.clone(),
            window_size: config.window_size,
            leave_window_days: config.leave_window_days,
            activity_threshold: config.min_activity,
            total_admins: outcome.rankings.len(),
            excluded_by_activity: outcome.excluded,
        },
        summary_statistics: summarize(&outcome.rankings),
        insights: insights(&outcome.rankings),
        data_issues: &outcome.issues,
        rankings: &outcome.rankings,
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

/// `<dir>/<stem>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn timestamped_path(dir: &Path, stem: &str, ext: &str, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("{}_{}.{}", stem, at.format("%Y%m%d_%H%M%S"), ext))
}

fn truncate(name: &str, width: usize) -> String {
    name.chars().take(width).collect()
}

fn fmt_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"))
}

pub fn render_table(outcome: &RankingOutcome, top_n: usize) -> String {
    let mut output = String::new();
    let rankings = &outcome.rankings;

    if rankings.is_empty() {
        let _ = writeln!(output, "No admins qualified for ranking.");
        return output;
    }

    let _ = writeln!(output, "{}", "=".repeat(80));
    let _ = writeln!(output, "TOP {} ADMIN RANKINGS ({})", top_n, outcome.formula_name);
    let _ = writeln!(output, "{}", outcome.formula_expression);
    let _ = writeln!(output, "Snapshot: {}", outcome.taken_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(output, "{}", "=".repeat(80));
    let _ = writeln!(
        output,
        "{:<5} {:<20} {:<12} {:<8} {:<8} {:<8} {:<8}",
        "Rank", "Admin Name", "Score", "CR", "CDT", "R", "LR"
    );
    let _ = writeln!(output, "{}", "-".repeat(80));

    for score in rankings.iter().take(top_n) {
        let ScoreTerms {
            call_rating,
            delivery,
            chat_rating,
            leave,
        } = score.terms;
        let _ = writeln!(
            output,
            "{:<5} {:<20} {:<12.3} {:<8.3} {:<8.3} {:<8.3} {:<8.3}",
            score.rank,
            truncate(&score.admin_name, 19),
            score.score,
            call_rating,
            delivery,
            chat_rating,
            leave
        );
    }

    let stats = summarize(rankings);
    let _ = writeln!(output);
    let _ = writeln!(output, "Total admins ranked: {}", rankings.len());
    if outcome.excluded > 0 {
        let _ = writeln!(output, "Excluded by activity threshold: {}", outcome.excluded);
    }
    let _ = writeln!(output, "Average score: {}", fmt_optional(stats.avg_score));
    let _ = writeln!(output, "Highest score: {}", fmt_optional(stats.max_score));
    let _ = writeln!(output, "Lowest score: {}", fmt_optional(stats.min_score));
    let _ = writeln!(output, "Standard deviation: {}", fmt_optional(stats.std_score));

    output
}

pub fn render_insights(insights: &Insights) -> String {
    let mut output = String::new();
    let dist = &insights.performance_distribution;
    let na = |name: &Option<String>| name.clone().unwrap_or_else(|| "n/a".to_string());

    let _ = writeln!(output, "Performance distribution:");
    let _ = writeln!(output, "- Excellent: {} admins", dist.excellent);
    let _ = writeln!(output, "- Good: {} admins", dist.good);
    let _ = writeln!(output, "- Average: {} admins", dist.average);
    let _ = writeln!(output, "- Below average: {} admins", dist.below_average);
    let _ = writeln!(output);

    let comp = &insights.component_analysis;
    let _ = writeln!(output, "Top performers by category:");
    let _ = writeln!(output, "- Best call rating: {}", na(&comp.strongest_in_call_rating));
    let _ = writeln!(output, "- Fastest delivery: {}", na(&comp.fastest_delivery));
    let _ = writeln!(output, "- Best chat rating: {}", na(&comp.best_chat_rating));
    let _ = writeln!(output, "- Highest availability: {}", na(&comp.highest_availability));

    output
}

pub fn render_analysis(analysis: &AdminAnalysis) -> String {
    let mut output = String::new();
    let window = &analysis.window;

    let _ = writeln!(output, "{}", "=".repeat(60));
    let _ = writeln!(output, "ADMIN ANALYSIS: {} ({})", analysis.admin_name, analysis.admin_id);
    let _ = writeln!(output, "{}", "=".repeat(60));
    let _ = writeln!(output, "Formula: {}", analysis.formula_expression);
    let _ = writeln!(output, "Score: {:.3}", analysis.score);
    let _ = writeln!(output, "  Call rating term:  {:.3}", analysis.terms.call_rating);
    let _ = writeln!(output, "  Delivery term:     {:.3}", analysis.terms.delivery);
    let _ = writeln!(output, "  Chat rating term:  {:.3}", analysis.terms.chat_rating);
    let _ = writeln!(output, "  Leave term:        {:.3}", analysis.terms.leave);
    let _ = writeln!(output);
    let _ = writeln!(output, "Metrics:");
    let _ = writeln!(output, "  cr50:  {:.3} over {} calls", window.cr50, window.calls_in_window);
    let _ = writeln!(output, "  cdt50: {:.1} minutes", window.cdt50);
    let _ = writeln!(output, "  r50:   {:.3} over {} ratings", window.r50, window.ratings_in_window);
    let _ = writeln!(output, "  lr1m:  {}", window.lr1m);
    let _ = writeln!(output);
    let _ = writeln!(output, "Record counts:");
    let _ = writeln!(output, "  Total calls: {}", window.total_calls);
    let _ = writeln!(output, "  Chat ratings in window: {}", analysis.recent_ratings.len());
    let _ = writeln!(output, "  Leave requests in window: {}", analysis.recent_leaves.len());
    if let Some(threshold) = analysis.activity_threshold {
        let verdict = if analysis.meets_activity_threshold {
            "meets"
        } else {
            "does not meet"
        };
        let _ = writeln!(output, "  {} the activity threshold ({})", verdict, threshold);
    }

    output
}
