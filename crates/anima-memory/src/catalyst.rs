//! Catalyst probe.
//!
//! A deterministic lexical detector for breakthrough-flavoured content.
//! Runs only as an async job after add — it never blocks the response
//! and never raises to the caller.

use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use anima_core::constants::{CATALYST_INITIAL_PHI, PHI_MAX};
use anima_core::errors::AnimaResult;
use anima_storage::{map_sqlx, StoragePool};

/// Markers that tend to accompany a breakthrough.
const INSIGHT_MARKERS: &[&str] = &[
    "realized",
    "realised",
    "breakthrough",
    "epiphany",
    "suddenly",
    "clicked",
    "connects",
    "insight",
    "aha",
];

/// Whether content reads like a breakthrough.
///
/// Fires on an insight marker or on unusual exclamatory density.
pub fn is_breakthrough(content: &str) -> bool {
    let lowered = content.to_lowercase();
    if INSIGHT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return true;
    }
    content.chars().filter(|&c| c == '!').count() >= 2
}

/// Probe one memory and flag it when the heuristic fires.
///
/// Flagging grants the catalyst φ floor; it never lowers φ and never
/// unsets an existing flag. Returns whether the flag was newly set.
pub async fn run_probe(pool: &StoragePool, memory_id: Uuid) -> AnimaResult<bool> {
    let mut conn = pool.acquire().await?;

    let row = sqlx::query(
        "SELECT content, is_catalyst FROM memories WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(memory_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    let Some(row) = row else {
        return Ok(false);
    };
    let content: String = row.try_get("content").map_err(map_sqlx)?;
    let already: bool = row.try_get("is_catalyst").map_err(map_sqlx)?;

    if already || !is_breakthrough(&content) {
        return Ok(false);
    }

    sqlx::query(
        "UPDATE memories \
         SET is_catalyst = TRUE, \
             resonance_phi = LEAST(GREATEST(resonance_phi, $2), $3), \
             updated_at = now() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(memory_id)
    .bind(CATALYST_INITIAL_PHI)
    .bind(PHI_MAX)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    info!(memory_id = %memory_id, "catalyst probe flagged memory");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_fire() {
        assert!(is_breakthrough("I finally realized the cache was the problem"));
        assert!(is_breakthrough("This connects the tier model to decay"));
        assert!(is_breakthrough("A real BREAKTHROUGH in the handshake design"));
    }

    #[test]
    fn exclamatory_density_fires() {
        assert!(is_breakthrough("It works!! At last!"));
        assert!(!is_breakthrough("It works! Finally."));
    }

    #[test]
    fn plain_notes_do_not_fire() {
        assert!(!is_breakthrough("Weekly planning notes for the storage layer"));
        assert!(!is_breakthrough(""));
    }
}
