use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{AdminId, CallEvent, ChatRatingEvent, EventSnapshot, LeaveRequestEvent, MetricWindow};

pub const DEFAULT_WINDOW_SIZE: usize = 50;
pub const DEFAULT_LEAVE_WINDOW_DAYS: i64 = 30;
pub const MAX_LEAVE_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Default)]
pub struct AdminEvents<'a> {
    pub calls: Vec<&'a CallEvent>,
    pub chat_ratings: Vec<&'a ChatRatingEvent>,
    pub leave_requests: Vec<&'a LeaveRequestEvent>,
}

pub fn group_by_admin(snapshot: &EventSnapshot) -> BTreeMap<AdminId, AdminEvents<'_>> {
    let mut groups: BTreeMap<AdminId, AdminEvents<'_>> = BTreeMap::new();

    for call in &snapshot.calls {
        groups.entry(call.admin_id.clone()).or_default().calls.push(call);
    }
    for rating in &snapshot.chat_ratings {
        groups
            .entry(rating.admin_id.clone())
            .or_default()
            .chat_ratings
            .push(rating);
    }
    for leave in &snapshot.leave_requests {
        groups
            .entry(leave.admin_id.clone())
            .or_default()
            .leave_requests
            .push(leave);
    }

    groups
}

#[derive(Debug, Clone)]
pub struct WindowAggregator {
    window_size: usize,
    leave_window: Duration,
}

impl Default for WindowAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE, DEFAULT_LEAVE_WINDOW_DAYS)
    }
}

impl WindowAggregator {
    pub fn new(window_size: usize, leave_window_days: i64) -> Self {
        Self {
            window_size,
            leave_window: Duration::days(leave_window_days.clamp(0, MAX_LEAVE_WINDOW_DAYS)),
        }
    }

    pub fn aggregate(&self, snapshot: &EventSnapshot) -> Vec<MetricWindow> {
        group_by_admin(snapshot)
            .into_iter()
            .map(|(admin_id, events)| self.aggregate_admin(admin_id, &events, snapshot.taken_at))
            .collect()
    }

    pub fn aggregate_admin(
        &self,
        admin_id: AdminId,
        events: &AdminEvents<'_>,
        taken_at: DateTime<Utc>,
    ) -> MetricWindow {
        let calls = self.select_recent(&events.calls, |call| call.occurred_at);
        let ratings = self.select_recent(&events.chat_ratings, |rating| rating.occurred_at);
        let leaves = self.leaves_in_window(&events.leave_requests, taken_at);

        MetricWindow {
            admin_id,
            cr50: mean(calls.iter().filter_map(|call| call.internal_rating)),
            cdt50: mean(calls.iter().filter_map(|call| call.delivery_time)),
            r50: mean(ratings.iter().map(|rating| rating.rating)),
            lr1m: u32::try_from(leaves.len()).unwrap_or(u32::MAX),
            total_calls: events.calls.len(),
            calls_in_window: calls.len(),
            ratings_in_window: ratings.len(),
        }
    }

    // Stable sort: events sharing a timestamp keep arrival order.
    pub fn select_recent<'a, T>(
        &self,
        events: &[&'a T],
        occurred_at: impl Fn(&T) -> DateTime<Utc>,
    ) -> Vec<&'a T> {
        let mut selected = events.to_vec();
        selected.sort_by(|a, b| occurred_at(b).cmp(&occurred_at(a)));
        selected.truncate(self.window_size);
        selected
    }

    pub fn leaves_in_window<'a>(
        &self,
        events: &[&'a LeaveRequestEvent],
        taken_at: DateTime<Utc>,
    ) -> Vec<&'a LeaveRequestEvent> {
        let since = self.leave_window_start(taken_at);
        let mut selected: Vec<&LeaveRequestEvent> = events
            .iter()
            .copied()
            .filter(|leave| leave.occurred_at >= since && leave.occurred_at <= taken_at)
            .collect();
        selected.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        selected
    }

    pub fn leave_window_start(&self, taken_at: DateTime<Utc>) -> DateTime<Utc> {
        taken_at
            .checked_sub_signed(self.leave_window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut average = 0.0;
    let mut count = 0u64;
    for value in values {
        count += 1;
        average += (value - average) / count as f64;
    }
    average
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn taken_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap()
    }

    fn call(id: &str, minutes_ago: i64, rating: Option<f64>, delivery: Option<f64>) -> CallEvent {
        CallEvent {
            admin_id: AdminId::new(id),
            internal_rating: rating,
            delivery_time: delivery,
            occurred_at: taken_at() - Duration::minutes(minutes_ago),
        }
    }

    fn chat(id: &str, minutes_ago: i64, rating: f64) -> ChatRatingEvent {
        ChatRatingEvent {
            admin_id: AdminId::new(id),
            rating,
            occurred_at: taken_at() - Duration::minutes(minutes_ago),
        }
    }

    fn leave(id: &str, days_ago: i64) -> LeaveRequestEvent {
        LeaveRequestEvent {
            admin_id: AdminId::new(id),
            occurred_at: taken_at() - Duration::days(days_ago),
        }
    }

    fn snapshot(
        calls: Vec<CallEvent>,
        chat_ratings: Vec<ChatRatingEvent>,
        leave_requests: Vec<LeaveRequestEvent>,
    ) -> EventSnapshot {
        EventSnapshot {
            taken_at: taken_at(),
            calls,
            chat_ratings,
            leave_requests,
            ..EventSnapshot::default()
        }
    }

    #[test]
    fn window_keeps_only_the_most_recent_events() {
        // 60 calls: the newest 50 rate 5.0, the 10 oldest rate 1.0.
        let calls: Vec<CallEvent> = (0..60)
            .map(|i| {
                let rating = if i < 50 { 5.0 } else { 1.0 };
                call("a", i, Some(rating), Some(10.0))
            })
            .collect();
        let windows = WindowAggregator::default().aggregate(&snapshot(calls, Vec::new(), Vec::new()));

        assert_eq!(windows.len(), 1);
        let window = &windows[0];
        assert_eq!(window.calls_in_window, 50);
        assert_eq!(window.total_calls, 60);
        assert!((window.cr50 - 5.0).abs() < 1e-12);
    }

    #[test]
    fn selection_ignores_arrival_order_of_timestamps() {
        let calls: Vec<CallEvent> = vec![
            call("a", 30, Some(1.0), None),
            call("a", 10, Some(3.0), None),
            call("a", 20, Some(2.0), None),
        ];
        let refs: Vec<&CallEvent> = calls.iter().collect();
        let selected = WindowAggregator::new(2, 30).select_recent(&refs, |c| c.occurred_at);

        let ratings: Vec<Option<f64>> = selected.iter().map(|c| c.internal_rating).collect();
        assert_eq!(ratings, vec![Some(3.0), Some(2.0)]);
    }

    #[test]
    fn duplicate_timestamps_break_ties_by_arrival_order() {
        let calls: Vec<CallEvent> = vec![
            call("a", 5, Some(1.0), None),
            call("a", 5, Some(2.0), None),
            call("a", 5, Some(3.0), None),
        ];
        let refs: Vec<&CallEvent> = calls.iter().collect();
        let aggregator = WindowAggregator::new(2, 30);

        for _ in 0..3 {
            let selected = aggregator.select_recent(&refs, |c| c.occurred_at);
            let ratings: Vec<Option<f64>> = selected.iter().map(|c| c.internal_rating).collect();
            assert_eq!(ratings, vec![Some(1.0), Some(2.0)]);
        }
    }

    #[test]
    fn starved_window_uses_everything_available() {
        let windows = WindowAggregator::default().aggregate(&snapshot(
            vec![call("a", 1, Some(4.0), Some(20.0)), call("a", 2, Some(2.0), Some(40.0))],
            vec![chat("a", 1, 3.0)],
            Vec::new(),
        ));
        let window = &windows[0];
        assert_eq!(window.calls_in_window, 2);
        assert!((window.cr50 - 3.0).abs() < 1e-12);
        assert!((window.cdt50 - 30.0).abs() < 1e-12);
        assert!((window.r50 - 3.0).abs() < 1e-12);
        assert_eq!(window.ratings_in_window, 1);
    }

    #[test]
    fn missing_streams_use_zero_sentinels() {
        let windows = WindowAggregator::default().aggregate(&snapshot(
            Vec::new(),
            Vec::new(),
            vec![leave("only-leaves", 3)],
        ));
        let window = &windows[0];
        assert_eq!(window.admin_id.as_str(), "only-leaves");
        assert_eq!(window.cr50, 0.0);
        assert_eq!(window.cdt50, 0.0);
        assert_eq!(window.r50, 0.0);
        assert_eq!(window.lr1m, 1);
        assert_eq!(window.total_calls, 0);
    }

    #[test]
    fn missing_call_values_are_skipped_in_means() {
        let windows = WindowAggregator::default().aggregate(&snapshot(
            vec![
                call("a", 1, Some(4.0), None),
                call("a", 2, None, Some(30.0)),
                call("a", 3, None, None),
            ],
            Vec::new(),
            Vec::new(),
        ));
        let window = &windows[0];
        assert_eq!(window.total_calls, 3);
        assert!((window.cr50 - 4.0).abs() < 1e-12);
        assert!((window.cdt50 - 30.0).abs() < 1e-12);
    }

    #[test]
    fn leave_count_is_time_bounded_not_count_bounded() {
        let mut leaves: Vec<LeaveRequestEvent> = (0..70).map(|_| leave("a", 2)).collect();
        leaves.push(leave("a", 30));
        leaves.push(leave("a", 31));
        leaves.push(LeaveRequestEvent {
            admin_id: AdminId::new("a"),
            occurred_at: taken_at() + Duration::days(1),
        });

        let windows = WindowAggregator::default().aggregate(&snapshot(Vec::new(), Vec::new(), leaves));
        assert_eq!(windows[0].lr1m, 71);
    }

    #[test]
    fn honours_configured_window_size() {
        let ratings: Vec<ChatRatingEvent> = (0..20)
            .map(|i| chat("a", i, if i < 5 { 5.0 } else { 0.0 }))
            .collect();
        let windows = WindowAggregator::new(5, 30).aggregate(&snapshot(Vec::new(), ratings, Vec::new()));
        assert_eq!(windows[0].ratings_in_window, 5);
        assert!((windows[0].r50 - 5.0).abs() < 1e-12);
    }

    #[test]
    fn mean_stays_finite_for_large_values() {
        let value = mean([f64::MAX, f64::MAX, f64::MAX].into_iter());
        assert!(value.is_finite());
        assert_eq!(mean(std::iter::empty()), 0.0);
    }

    #[test]
    fn oversized_leave_window_is_capped() {
        let taken = DateTime::<Utc>::MIN_UTC + Duration::days(10);
        let aggregator = WindowAggregator::new(DEFAULT_WINDOW_SIZE, i64::MAX);
        assert_eq!(aggregator.leave_window_start(taken), DateTime::<Utc>::MIN_UTC);

        let windows = WindowAggregator::new(DEFAULT_WINDOW_SIZE, 100_000_000)
            .aggregate(&snapshot(Vec::new(), Vec::new(), vec![leave("a", 36_000)]));
        assert_eq!(windows[0].lr1m, 1);
    }

    #[test]
    fn population_covers_every_stream_in_id_order() {
        let windows = WindowAggregator::default().aggregate(&snapshot(
            vec![call("c", 1, Some(4.0), Some(10.0))],
            vec![chat("b", 1, 4.0)],
            vec![leave("a", 1)],
        ));
        let ids: Vec<&str> = windows.iter().map(|w| w.admin_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
