//! Tier & resonance rules.
//!
//! Promotion thresholds are pure functions; the decay entry points run
//! outside the request path and are cancellable between batches (every
//! batch boundary is an await point).

use chrono::{Duration, Utc};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

use anima_core::constants::{
    MAX_BATCH_ROWS, PHI_DECAY_FACTOR, PHI_DECAY_FLOOR, PHI_DECAY_IDLE_DAYS,
    STABLE_PROMOTION_THRESHOLD, THREAD_PROMOTION_THRESHOLD, TIER_DECAY_ACTIVE_IDLE_DAYS,
    TIER_DECAY_THREAD_IDLE_DAYS,
};
use anima_core::errors::AnimaResult;
use anima_core::models::memory::Tier;
use anima_core::models::promotion::PromotionReason;
use anima_storage::{map_sqlx, StoragePool};

/// Where a memory is promoted once its access count crosses a threshold.
/// `network` is never an automatic destination.
pub fn promotion_target(tier: Tier, access_count: i64) -> Option<Tier> {
    match tier {
        Tier::Active if access_count >= THREAD_PROMOTION_THRESHOLD => Some(Tier::Thread),
        Tier::Thread if access_count >= STABLE_PROMOTION_THRESHOLD => Some(Tier::Stable),
        _ => None,
    }
}

/// Insert audit rows for a batch of tier changes.
///
/// `changes` carries (memory_id, from, to, access_count, days_idle).
pub async fn record_promotions(
    pool: &StoragePool,
    changes: &[(Uuid, Tier, Tier, i64, i64)],
    reason: PromotionReason,
) -> AnimaResult<()> {
    for chunk in anima_storage::batch::chunks(changes) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO tier_promotions \
             (id, memory_id, from_tier, to_tier, reason, \
              access_count_at_promotion, days_since_last_access) ",
        );
        builder.push_values(chunk, |mut row, (id, from, to, count, days)| {
            row.push_bind(Uuid::new_v4())
                .push_bind(id)
                .push_bind(from.as_str())
                .push_bind(to.as_str())
                .push_bind(reason.as_str())
                .push_bind(count)
                .push_bind(days);
        });

        let mut conn = pool.acquire().await?;
        builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx)?;
    }
    Ok(())
}

/// Daily tier decay: idle active memories sink to thread, idle thread
/// memories sink to stable. Returns the number of demotions.
pub async fn run_tier_decay(pool: &StoragePool) -> AnimaResult<u64> {
    let mut total = 0u64;
    total += decay_step(
        pool,
        Tier::Active,
        Tier::Thread,
        TIER_DECAY_ACTIVE_IDLE_DAYS,
    )
    .await?;
    total += decay_step(
        pool,
        Tier::Thread,
        Tier::Stable,
        TIER_DECAY_THREAD_IDLE_DAYS,
    )
    .await?;
    info!(demotions = total, "tier decay pass complete");
    Ok(total)
}

async fn decay_step(
    pool: &StoragePool,
    from: Tier,
    to: Tier,
    idle_days: i64,
) -> AnimaResult<u64> {
    let cutoff = Utc::now() - Duration::days(idle_days);
    let mut demoted = 0u64;

    // Batched so long-running maintenance can be cancelled between chunks.
    loop {
        let mut conn = pool.acquire().await?;
        let candidates = sqlx::query(
            "SELECT id, access_count, \
             EXTRACT(DAY FROM now() - last_accessed_at)::bigint AS days_idle \
             FROM memories \
             WHERE deleted_at IS NULL AND tier = $1 AND last_accessed_at < $2 \
             LIMIT $3",
        )
        .bind(from.as_str())
        .bind(cutoff)
        .bind(MAX_BATCH_ROWS as i64)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        if candidates.is_empty() {
            break;
        }

        let mut ids = Vec::with_capacity(candidates.len());
        let mut changes = Vec::with_capacity(candidates.len());
        for row in &candidates {
            let id: Uuid = row.try_get("id").map_err(map_sqlx)?;
            let count: i64 = row.try_get("access_count").map_err(map_sqlx)?;
            let days: i64 = row.try_get("days_idle").map_err(map_sqlx)?;
            ids.push(id);
            changes.push((id, from, to, count, days));
        }

        sqlx::query(
            "UPDATE memories SET tier = $2, tier_updated_at = now(), updated_at = now() \
             WHERE id = ANY($1)",
        )
        .bind(&ids)
        .bind(to.as_str())
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        record_promotions(pool, &changes, PromotionReason::TimeDecay).await?;
        demoted += ids.len() as u64;

        if candidates.len() < MAX_BATCH_ROWS {
            break;
        }
    }

    Ok(demoted)
}

/// Monthly φ decay: memories above the floor that have not been touched
/// in the idle window lose five percent of their resonance.
pub async fn run_phi_decay(pool: &StoragePool) -> AnimaResult<u64> {
    let cutoff = Utc::now() - Duration::days(PHI_DECAY_IDLE_DAYS);
    let mut conn = pool.acquire().await?;

    let result = sqlx::query(
        "UPDATE memories SET resonance_phi = resonance_phi * $1, updated_at = now() \
         WHERE deleted_at IS NULL AND resonance_phi > $2 AND last_accessed_at < $3",
    )
    .bind(PHI_DECAY_FACTOR)
    .bind(PHI_DECAY_FLOOR)
    .bind(cutoff)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx)?;

    let decayed = result.rows_affected();
    info!(decayed, "phi decay pass complete");
    Ok(decayed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_promotes_to_thread_at_threshold() {
        assert_eq!(promotion_target(Tier::Active, 4), None);
        assert_eq!(promotion_target(Tier::Active, 5), Some(Tier::Thread));
        assert_eq!(promotion_target(Tier::Active, 50), Some(Tier::Thread));
    }

    #[test]
    fn thread_promotes_to_stable_at_threshold() {
        assert_eq!(promotion_target(Tier::Thread, 19), None);
        assert_eq!(promotion_target(Tier::Thread, 20), Some(Tier::Stable));
    }

    #[test]
    fn stable_and_network_never_auto_promote() {
        assert_eq!(promotion_target(Tier::Stable, 1_000), None);
        assert_eq!(promotion_target(Tier::Network, 1_000), None);
    }
}
