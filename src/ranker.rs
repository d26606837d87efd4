use std::cmp::Ordering;

use crate::models::AdminScore;

/// Score descending, then name ascending, then id ascending.
pub fn compare(a: &AdminScore, b: &AdminScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.admin_name.cmp(&b.admin_name))
        .then_with(|| a.admin_id.cmp(&b.admin_id))
}

/// Orders scored admins and assigns 1-based ranks. Equal scores still get
/// distinct consecutive ranks, following the tie-break order.
pub fn rank(mut scored: Vec<AdminScore>) -> Vec<AdminScore> {
    scored.sort_by(compare);
    for (index, score) in scored.iter_mut().enumerate() {
        score.rank = index + 1;
    }
    scored
}
