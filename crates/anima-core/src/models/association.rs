//! Co-occurrence edges between memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::STRENGTH_DIVISOR;

/// An undirected co-occurrence edge, stored as an ordered pair
/// (`memory_a < memory_b`) so mirror duplicates cannot exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    pub memory_a: Uuid,
    pub memory_b: Uuid,
    pub co_occurrence_count: i64,
    /// `ln(1 + count) / 10`, clamped to [0, 1].
    pub strength: f64,
    pub first_co_occurred_at: DateTime<Utc>,
    pub last_co_occurred_at: DateTime<Utc>,
    /// Conversations this pair co-occurred in. A bag; duplicates allowed.
    pub conversation_contexts: Vec<String>,
}

impl Association {
    /// Order two ids into the canonical `(a, b)` with `a < b`.
    pub fn ordered_pair(x: Uuid, y: Uuid) -> (Uuid, Uuid) {
        if x < y {
            (x, y)
        } else {
            (y, x)
        }
    }
}

/// Association strength for a given co-occurrence count.
pub fn strength_for_count(count: i64) -> f64 {
    ((1.0 + count.max(0) as f64).ln() / STRENGTH_DIVISOR).clamp(0.0, 1.0)
}

/// All C(N,2) canonical pairs over a set of ids.
///
/// Ids are deduplicated first; order of the output is deterministic
/// (sorted by the pair itself).
pub fn all_pairs(ids: &[Uuid]) -> Vec<(Uuid, Uuid)> {
    let mut unique: Vec<Uuid> = ids.to_vec();
    unique.sort();
    unique.dedup();

    let mut pairs = Vec::with_capacity(unique.len() * unique.len().saturating_sub(1) / 2);
    for i in 0..unique.len() {
        for j in (i + 1)..unique.len() {
            pairs.push((unique[i], unique[j]));
        }
    }
    pairs
}
