use tracing::warn;

use crate::error::DataIssue;
use crate::models::{AdminId, CallEvent, ChatRatingEvent, EventSnapshot};

pub const MAX_RATING: f64 = 5.0;

/// Clamps out-of-range values in place. Records are never dropped, so every
/// admin present in the source stays present in the ranking.
pub fn sanitize(snapshot: &mut EventSnapshot) -> Vec<DataIssue> {
    let mut issues = Vec::new();

    for call in snapshot.calls.iter_mut() {
        sanitize_call(call, &mut issues);
    }
    for rating in snapshot.chat_ratings.iter_mut() {
        sanitize_chat_rating(rating, &mut issues);
    }

    if !issues.is_empty() {
        warn!(count = issues.len(), "clamped invalid event values");
    }
    issues
}

fn sanitize_call(call: &mut CallEvent, issues: &mut Vec<DataIssue>) {
    if let Some(value) = call.internal_rating {
        let repaired = if value.is_nan() {
            None
        } else {
            Some(value.clamp(0.0, MAX_RATING))
        };
        if repaired != Some(value) {
            issues.push(invalid(&call.admin_id, "internal_rating", value, repaired));
            call.internal_rating = repaired;
        }
    }

    if let Some(value) = call.delivery_time {
        let repaired = if !value.is_finite() {
            None
        } else {
            Some(value.max(0.0))
        };
        if repaired != Some(value) {
            issues.push(invalid(&call.admin_id, "delivery_time", value, repaired));
            call.delivery_time = repaired;
        }
    }
}

fn sanitize_chat_rating(event: &mut ChatRatingEvent, issues: &mut Vec<DataIssue>) {
    let value = event.rating;
    let repaired = if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_RATING)
    };
    if repaired != value {
        issues.push(invalid(&event.admin_id, "rating", value, Some(repaired)));
        event.rating = repaired;
    }
}

fn invalid(admin_id: &AdminId, field: &'static str, original: f64, replacement: Option<f64>) -> DataIssue {
    DataIssue::InvalidEventData {
        admin_id: admin_id.clone(),
        field,
        original: original.to_string(),
        replacement,
    }
}

/// Resolves a display name, falling back to the identifier itself.
pub fn resolve_name(snapshot: &EventSnapshot, admin_id: &AdminId, issues: &mut Vec<DataIssue>) -> String {
    match snapshot.admin_names.get(admin_id) {
        Some(name) if !name.trim().is_empty() => name.clone(),
        _ => {
            warn!(admin_id = %admin_id, "no display name for admin");
            issues.push(DataIssue::UnknownAdmin {
                admin_id: admin_id.clone(),
            });
            admin_id.to_string()
        }
    }
}
