use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminId(pub String);

impl AdminId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdminId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<uuid::Uuid> for AdminId {
    fn from(value: uuid::Uuid) -> Self {
        Self::new(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallEvent {
    pub admin_id: AdminId,
    pub internal_rating: Option<f64>,
    /// Minutes.
    pub delivery_time: Option<f64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRatingEvent {
    pub admin_id: AdminId,
    pub rating: f64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaveRequestEvent {
    pub admin_id: AdminId,
    pub occurred_at: DateTime<Utc>,
}

/// Event vectors stay in arrival order; that order breaks timestamp ties.
#[derive(Debug, Clone, Default)]
pub struct EventSnapshot {
    pub taken_at: DateTime<Utc>,
    pub calls: Vec<CallEvent>,
    pub chat_ratings: Vec<ChatRatingEvent>,
    pub leave_requests: Vec<LeaveRequestEvent>,
    pub admin_names: BTreeMap<AdminId, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricWindow {
    pub admin_id: AdminId,
    pub cr50: f64,
    pub cdt50: f64,
    pub r50: f64,
    pub lr1m: u32,
    /// Raw call count before windowing; the activity filter reads this.
    pub total_calls: usize,
    pub calls_in_window: usize,
    pub ratings_in_window: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedMetrics {
    pub cr_norm: f64,
    pub r_norm: f64,
    pub cdt_norm: f64,
    pub lr_norm: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreTerms {
    pub call_rating: f64,
    pub delivery: f64,
    pub chat_rating: f64,
    pub leave: f64,
}

impl ScoreTerms {
    pub fn total(&self) -> f64 {
        self.call_rating + self.delivery + self.chat_rating + self.leave
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminScore {
    pub rank: usize,
    pub admin_id: AdminId,
    pub admin_name: String,
    pub score: f64,
    pub terms: ScoreTerms,
    pub raw_metrics: MetricWindow,
    pub normalized_metrics: Option<NormalizedMetrics>,
}
