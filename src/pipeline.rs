use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::activity::{self, ActivityThreshold};
use crate::config::RankingConfig;
use crate::error::DataIssue;
use crate::ingest;
use crate::models::{
    AdminId, AdminScore, CallEvent, ChatRatingEvent, EventSnapshot, LeaveRequestEvent, MetricWindow,
    NormalizedMetrics, ScoreTerms,
};
use crate::ranker;
use crate::window;

/// Result of one ranking run.
#[derive(Debug, Clone)]
pub struct RankingOutcome {
    pub taken_at: DateTime<Utc>,
    pub formula_name: &'static str,
    pub formula_expression: String,
    pub rankings: Vec<AdminScore>,
    pub issues: Vec<DataIssue>,
    /// Admins removed by the activity threshold.
    pub excluded: usize,
}

/// Snapshot in, ranking out. Pure apart from logging.
pub fn run(mut snapshot: EventSnapshot, config: &RankingConfig) -> RankingOutcome {
    let mut issues = ingest::sanitize(&mut snapshot);
    let formula = config.formula();

    let mut windows = config.aggregator().aggregate(&snapshot);
    let population = windows.len();
    info!(admins = population, "aggregated metric windows");

    if let Some(threshold) = formula.activity_threshold() {
        windows = activity::filter(windows, threshold);
        info!(
            %threshold,
            kept = windows.len(),
            excluded = population - windows.len(),
            "applied activity threshold"
        );
    }
    let excluded = population - windows.len();

    let scored: Vec<AdminScore> = windows
        .into_iter()
        .map(|window| {
            let admin_name = ingest::resolve_name(&snapshot, &window.admin_id, &mut issues);
            let score = formula.score(&window);
            debug!(admin_id = %window.admin_id, score, "scored admin");
            AdminScore {
                rank: 0,
                admin_id: window.admin_id.clone(),
                admin_name,
                score,
                terms: formula.terms(&window),
                normalized_metrics: formula.normalize(&window),
                raw_metrics: window,
            }
        })
        .collect();

    RankingOutcome {
        taken_at: snapshot.taken_at,
        formula_name: formula.name(),
        formula_expression: formula.expression(),
        rankings: ranker::rank(scored),
        issues,
        excluded,
    }
}

/// Drill-down for one admin: the scored window plus the records behind it.
#[derive(Debug, Clone, Serialize)]
pub struct AdminAnalysis {
    pub admin_id: AdminId,
    pub admin_name: String,
    pub formula_expression: String,
    pub score: f64,
    pub terms: ScoreTerms,
    pub normalized_metrics: Option<NormalizedMetrics>,
    pub window: MetricWindow,
    pub activity_threshold: Option<ActivityThreshold>,
    pub meets_activity_threshold: bool,
    pub recent_calls: Vec<CallEvent>,
    pub recent_ratings: Vec<ChatRatingEvent>,
    pub recent_leaves: Vec<LeaveRequestEvent>,
    pub issues: Vec<DataIssue>,
}

/// Scores a single admin regardless of the activity threshold; `None` when
/// the snapshot holds no events for them.
pub fn analyze(mut snapshot: EventSnapshot, config: &RankingConfig, admin_id: &AdminId) -> Option<AdminAnalysis> {
    let mut issues = ingest::sanitize(&mut snapshot);
    let formula = config.formula();
    let aggregator = config.aggregator();

    let mut groups = window::group_by_admin(&snapshot);
    let events = groups.remove(admin_id)?;
    let window = aggregator.aggregate_admin(admin_id.clone(), &events, snapshot.taken_at);
    let threshold = formula.activity_threshold();

    Some(AdminAnalysis {
        admin_id: admin_id.clone(),
        admin_name: ingest::resolve_name(&snapshot, admin_id, &mut issues),
        formula_expression: formula.expression(),
        score: formula.score(&window),
        terms: formula.terms(&window),
        normalized_metrics: formula.normalize(&window),
        activity_threshold: threshold,
        meets_activity_threshold: threshold.map_or(true, |t| t.admits(window.total_calls)),
        recent_calls: aggregator
            .select_recent(&events.calls, |call| call.occurred_at)
            .into_iter()
            .cloned()
            .collect(),
        recent_ratings: aggregator
            .select_recent(&events.chat_ratings, |rating| rating.occurred_at)
            .into_iter()
            .cloned()
            .collect(),
        recent_leaves: aggregator
            .leaves_in_window(&events.leave_requests, snapshot.taken_at)
            .into_iter()
            .cloned()
            .collect(),
        window,
        issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityMode;
    use crate::formula::FormulaKind;
    use chrono::{Duration, TimeZone};

    fn taken_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
    }

    fn calls(id: &str, count: i64, rating: f64, delivery: f64) -> Vec<CallEvent> {
        (0..count)
            .map(|i| CallEvent {
                admin_id: AdminId::new(id),
                internal_rating: Some(rating),
                delivery_time: Some(delivery),
                occurred_at: taken_at() - Duration::hours(i + 1),
            })
            .collect()
    }

    fn chats(id: &str, count: i64, rating: f64) -> Vec<ChatRatingEvent> {
        (0..count)
            .map(|i| ChatRatingEvent {
                admin_id: AdminId::new(id),
                rating,
                occurred_at: taken_at() - Duration::hours(i + 1),
            })
            .collect()
    }

    fn leaves(id: &str, count: i64) -> Vec<LeaveRequestEvent> {
        (0..count)
            .map(|i| LeaveRequestEvent {
                admin_id: AdminId::new(id),
                occurred_at: taken_at() - Duration::days(i + 1),
            })
            .collect()
    }

    fn sample_snapshot() -> EventSnapshot {
        let mut snapshot = EventSnapshot {
            taken_at: taken_at(),
            ..EventSnapshot::default()
        };
        snapshot.calls.extend(calls("A", 50, 5.0, 40.0));
        snapshot.calls.extend(calls("B", 9, 4.0, 20.0));
        snapshot.calls.extend(calls("C", 12, 3.0, 90.0));
        snapshot.chat_ratings.extend(chats("A", 50, 5.0));
        snapshot.chat_ratings.extend(chats("C", 5, 4.0));
        snapshot.leave_requests.extend(leaves("C", 2));
        for (id, name) in [("A", "Avery Lee"), ("B", "Jules Moreno"), ("C", "Kiara Patel")] {
            snapshot.admin_names.insert(AdminId::new(id), name.to_string());
        }
        snapshot
    }

    #[test]
    fn end_to_end_raw_lambda() {
        let outcome = run(sample_snapshot(), &RankingConfig::default());
        let top = &outcome.rankings[0];

        assert_eq!(top.admin_name, "Avery Lee");
        assert_eq!(top.rank, 1);
        assert_eq!(top.raw_metrics.cr50, 5.0);
        assert_eq!(top.raw_metrics.cdt50, 40.0);
        assert_eq!(top.raw_metrics.r50, 5.0);
        assert_eq!(top.raw_metrics.lr1m, 0);
        assert!((top.score - 11.025).abs() < 1e-9);
        assert!(top.normalized_metrics.is_none());
        assert_eq!(outcome.rankings.len(), 3);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn end_to_end_normalized_weighted() {
        let config = RankingConfig {
            formula: FormulaKind::NormalizedWeighted,
            ..RankingConfig::default()
        };
        let outcome = run(sample_snapshot(), &config);
        let top = &outcome.rankings[0];

        assert_eq!(top.admin_id.as_str(), "A");
        assert!((top.score - 6.0).abs() < 1e-12);
        assert_eq!(outcome.formula_name, "normalized-weighted");
        assert!(top.normalized_metrics.is_some());
    }

    #[test]
    fn activity_threshold_removes_admins_without_phantom_ranks() {
        let config = RankingConfig {
            min_activity: Some(ActivityThreshold {
                threshold: 10,
                mode: ActivityMode::AtLeast,
            }),
            ..RankingConfig::default()
        };
        let outcome = run(sample_snapshot(), &config);
        let ranked: Vec<(usize, &str)> = outcome
            .rankings
            .iter()
            .map(|s| (s.rank, s.admin_id.as_str()))
            .collect();

        assert_eq!(ranked, vec![(1, "A"), (2, "C")]);
        assert_eq!(outcome.excluded, 1);
    }

    #[test]
    fn empty_population_yields_empty_ranking() {
        let config = RankingConfig {
            min_activity: Some(ActivityThreshold {
                threshold: 1000,
                mode: ActivityMode::AtLeast,
            }),
            ..RankingConfig::default()
        };
        assert!(run(sample_snapshot(), &config).rankings.is_empty());

        let empty = EventSnapshot {
            taken_at: taken_at(),
            ..EventSnapshot::default()
        };
        assert!(run(empty, &RankingConfig::default()).rankings.is_empty());
    }

    #[test]
    fn invalid_events_are_clamped_and_admin_kept() {
        let mut snapshot = sample_snapshot();
        snapshot.calls.push(CallEvent {
            admin_id: AdminId::new("D"),
            internal_rating: Some(9.0),
            delivery_time: Some(-5.0),
            occurred_at: taken_at() - Duration::hours(1),
        });
        snapshot.admin_names.insert(AdminId::new("D"), "Dana Cruz".to_string());

        let outcome = run(snapshot, &RankingConfig::default());
        let dana = outcome
            .rankings
            .iter()
            .find(|s| s.admin_id.as_str() == "D")
            .expect("clamped admin is still ranked");

        assert_eq!(dana.raw_metrics.cr50, 5.0);
        assert_eq!(dana.raw_metrics.cdt50, 0.0);
        assert_eq!(outcome.issues.len(), 2);
    }

    #[test]
    fn unknown_admin_is_named_by_identifier() {
        let mut snapshot = sample_snapshot();
        snapshot.admin_names.remove(&AdminId::new("B"));

        let outcome = run(snapshot, &RankingConfig::default());
        let b = outcome
            .rankings
            .iter()
            .find(|s| s.admin_id.as_str() == "B")
            .expect("unnamed admin is still ranked");

        assert_eq!(b.admin_name, "B");
        assert_eq!(
            outcome.issues,
            vec![DataIssue::UnknownAdmin {
                admin_id: AdminId::new("B")
            }]
        );
    }

    #[test]
    fn repeated_runs_produce_identical_output() {
        let first = run(sample_snapshot(), &RankingConfig::default());
        let second = run(sample_snapshot(), &RankingConfig::default());

        let first_json = serde_json::to_string(&first.rankings).unwrap();
        let second_json = serde_json::to_string(&second.rankings).unwrap();
        assert_eq!(first_json, second_json);
    }

    #[test]
    fn equal_scores_get_distinct_ranks() {
        let mut snapshot = EventSnapshot {
            taken_at: taken_at(),
            ..EventSnapshot::default()
        };
        snapshot.calls.extend(calls("x2", 3, 4.0, 30.0));
        snapshot.calls.extend(calls("x1", 3, 4.0, 30.0));
        snapshot.admin_names.insert(AdminId::new("x1"), "Sam".to_string());
        snapshot.admin_names.insert(AdminId::new("x2"), "Sam".to_string());

        let outcome = run(snapshot, &RankingConfig::default());
        let ranked: Vec<(usize, &str)> = outcome
            .rankings
            .iter()
            .map(|s| (s.rank, s.admin_id.as_str()))
            .collect();
        assert_eq!(ranked, vec![(1, "x1"), (2, "x2")]);
    }

    #[test]
    fn analysis_ignores_threshold_but_reports_it() {
        let config = RankingConfig {
            min_activity: Some(ActivityThreshold {
                threshold: 10,
                mode: ActivityMode::AtLeast,
            }),
            ..RankingConfig::default()
        };
        let analysis = analyze(sample_snapshot(), &config, &AdminId::new("B")).expect("B has events");

        assert_eq!(analysis.admin_name, "Jules Moreno");
        assert!(!analysis.meets_activity_threshold);
        assert_eq!(analysis.recent_calls.len(), 9);
        assert!((analysis.score - 5.05).abs() < 1e-9);
        assert!(analysis.recent_calls[0].occurred_at > analysis.recent_calls[8].occurred_at);
    }

    #[test]
    fn analysis_of_unknown_admin_is_none() {
        assert!(analyze(sample_snapshot(), &RankingConfig::default(), &AdminId::new("nobody")).is_none());
    }

    #[test]
    fn analysis_lists_only_leaves_inside_window() {
        let mut snapshot = sample_snapshot();
        snapshot.leave_requests.push(LeaveRequestEvent {
            admin_id: AdminId::new("C"),
            occurred_at: taken_at() - Duration::days(45),
        });
        let analysis = analyze(snapshot, &RankingConfig::default(), &AdminId::new("C")).unwrap();
        assert_eq!(analysis.recent_leaves.len(), 2);
        assert_eq!(analysis.window.lr1m, 2);
    }
}
