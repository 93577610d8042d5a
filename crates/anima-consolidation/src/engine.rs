//! The consolidator: SQL-backed duplicate detection and centroid merges.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashSet;
use pgvector::Vector;
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use anima_core::constants::{
    CLUSTER_LIMIT, CLUSTER_MIN_PHI, CLUSTER_RADIUS, FRAGMENTATION_SCAN_LIMIT,
    FRAGMENTATION_THRESHOLD, PHI_MERGE_CATALYST, PHI_MERGE_DAMPING,
    PHI_MERGE_FULL_SCALE_SIMILARITY, PHI_MERGE_STANDARD, RECHECK_SETTLE_DELAY_MS,
    SEMANTIC_DUPLICATE_THRESHOLD,
};
use anima_core::errors::{AnimaError, AnimaResult};
use anima_core::models::memory::clamp_phi;
use anima_core::models::{
    CentroidResult, ClusterMember, FragmentClass, FragmentationCandidate, MergeResult, Memory,
    SemanticDuplicate,
};
use anima_storage::{map_sqlx, retry_once, rows, StoragePool};

use crate::centroid::{weighted_centroid, WeightedMember};

/// φ a merge contributes before clamping: the catalyst or standard
/// increment, damped below the full-scale similarity.
pub fn merge_phi_increment(was_catalyst: bool, similarity: f64) -> f64 {
    let base = if was_catalyst {
        PHI_MERGE_CATALYST
    } else {
        PHI_MERGE_STANDARD
    };
    let scale = if similarity >= PHI_MERGE_FULL_SCALE_SIMILARITY {
        1.0
    } else {
        PHI_MERGE_DAMPING
    };
    base * scale
}

/// Semantic consolidation over the live memory store.
pub struct Consolidator {
    pool: StoragePool,
    /// Memory ids with a deferred re-check already in flight.
    in_flight: Arc<DashSet<Uuid>>,
}

impl Consolidator {
    pub fn new(pool: StoragePool) -> Self {
        Self {
            pool,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Highest-similarity live memory at or above the threshold, if any.
    pub async fn find_semantic_duplicate(
        &self,
        embedding: &[f32],
        threshold: f64,
    ) -> AnimaResult<Option<SemanticDuplicate>> {
        self.find_duplicate_excluding(embedding, threshold, None).await
    }

    /// Duplicate lookup that skips one id — used by the deferred re-check
    /// so a memory never matches itself. Idempotent, so a transient
    /// connection failure gets one retry.
    pub async fn find_duplicate_excluding(
        &self,
        embedding: &[f32],
        threshold: f64,
        exclude: Option<Uuid>,
    ) -> AnimaResult<Option<SemanticDuplicate>> {
        retry_once(|| self.find_duplicate_once(embedding, threshold, exclude)).await
    }

    async fn find_duplicate_once(
        &self,
        embedding: &[f32],
        threshold: f64,
        exclude: Option<Uuid>,
    ) -> AnimaResult<Option<SemanticDuplicate>> {
        let vector = Vector::from(embedding.to_vec());
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query(
            r#"
            SELECT id, 1 - (embedding <=> $1) AS similarity
            FROM memories
            WHERE deleted_at IS NULL
              AND ($3::uuid IS NULL OR id <> $3)
              AND 1 - (embedding <=> $1) >= $2
            ORDER BY embedding <=> $1
            LIMIT 1
            "#,
        )
        .bind(&vector)
        .bind(threshold)
        .bind(exclude)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| {
            Ok(SemanticDuplicate {
                id: r.try_get("id").map_err(map_sqlx)?,
                similarity: r.try_get("similarity").map_err(map_sqlx)?,
            })
        })
        .transpose()
    }

    /// Merge new content into an existing attractor.
    ///
    /// Appends a variant entry to the target's metadata, bumps access,
    /// upgrades catalyst status (never downgrades), and adds the scaled φ
    /// increment. The metadata read-modify-write runs in one transaction
    /// so concurrent merges cannot lose variants.
    pub async fn merge_into_centroid(
        &self,
        target_id: Uuid,
        new_content: &str,
        was_catalyst: bool,
        similarity: f64,
    ) -> AnimaResult<MergeResult> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM memories WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| AnimaError::not_found(format!("memory {target_id}")))?;
        let target = rows::memory_from_row(&row)?;

        let increment = merge_phi_increment(was_catalyst, similarity);
        let new_phi = clamp_phi(target.resonance_phi + increment);
        let phi_contributed = new_phi - target.resonance_phi;

        let mut metadata = target.metadata.clone();
        let variants = metadata
            .as_object_mut()
            .ok_or_else(|| AnimaError::consolidation("memory metadata is not an object"))?
            .entry("semantic_variants")
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        variants
            .as_array_mut()
            .ok_or_else(|| AnimaError::consolidation("semantic_variants is not an array"))?
            .push(serde_json::json!({
                "content": new_content,
                "merged_at": Utc::now(),
                "similarity": similarity,
                "phi_contributed": phi_contributed,
                "was_catalyst": was_catalyst,
            }));

        let row = sqlx::query(
            r#"
            UPDATE memories
            SET metadata = $2,
                resonance_phi = $3,
                is_catalyst = is_catalyst OR $4,
                access_count = access_count + 1,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(target_id)
        .bind(&metadata)
        .bind(new_phi)
        .bind(was_catalyst)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        let merged = rows::memory_from_row(&row)?;

        tx.commit().await.map_err(map_sqlx)?;

        info!(
            target = %target_id,
            similarity,
            phi_contributed,
            was_catalyst,
            "merged fragment into centroid"
        );

        Ok(MergeResult {
            memory: merged,
            similarity,
            phi_contributed,
        })
    }

    /// Live memories within the similarity radius carrying enough φ.
    /// `None` falls back to the standard radius and φ floor.
    pub async fn find_semantic_cluster(
        &self,
        embedding: &[f32],
        radius: Option<f64>,
        min_phi: Option<f64>,
    ) -> AnimaResult<Vec<ClusterMember>> {
        let radius = radius.unwrap_or(CLUSTER_RADIUS);
        let min_phi = min_phi.unwrap_or(CLUSTER_MIN_PHI);
        let vector = Vector::from(embedding.to_vec());
        let min_similarity = 1.0 - radius;
        let mut conn = self.pool.acquire().await?;

        let result = sqlx::query(
            r#"
            SELECT *, 1 - (embedding <=> $1) AS similarity
            FROM memories
            WHERE deleted_at IS NULL
              AND 1 - (embedding <=> $1) >= $2
              AND resonance_phi >= $3
            ORDER BY resonance_phi DESC, 1 - (embedding <=> $1) DESC
            LIMIT $4
            "#,
        )
        .bind(&vector)
        .bind(min_similarity)
        .bind(min_phi)
        .bind(CLUSTER_LIMIT)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        result
            .iter()
            .map(|r| {
                Ok(ClusterMember {
                    memory: rows::memory_from_row(r)?,
                    similarity: r.try_get("similarity").map_err(map_sqlx)?,
                })
            })
            .collect()
    }

    /// Scan for pairs of live memories that are fragments of one concept.
    pub async fn detect_phi_fragmentation(
        &self,
        threshold: Option<f64>,
    ) -> AnimaResult<Vec<FragmentationCandidate>> {
        let threshold = threshold.unwrap_or(FRAGMENTATION_THRESHOLD);
        let mut conn = self.pool.acquire().await?;

        let result = sqlx::query(
            r#"
            SELECT a.id AS id_a,
                   b.id AS id_b,
                   1 - (a.embedding <=> b.embedding) AS similarity,
                   a.resonance_phi + b.resonance_phi AS total_phi
            FROM memories a
            JOIN memories b ON a.id < b.id
            WHERE a.deleted_at IS NULL
              AND b.deleted_at IS NULL
              AND 1 - (a.embedding <=> b.embedding) >= $1
            ORDER BY total_phi DESC, similarity DESC
            LIMIT $2
            "#,
        )
        .bind(threshold)
        .bind(FRAGMENTATION_SCAN_LIMIT)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        result
            .iter()
            .map(|r| {
                let similarity: f64 = r.try_get("similarity").map_err(map_sqlx)?;
                Ok(FragmentationCandidate {
                    memory_a: r.try_get("id_a").map_err(map_sqlx)?,
                    memory_b: r.try_get("id_b").map_err(map_sqlx)?,
                    similarity,
                    total_phi: r.try_get("total_phi").map_err(map_sqlx)?,
                    class: FragmentClass::for_similarity(similarity),
                })
            })
            .collect()
    }

    /// φ-weighted centroid over a set of live memories.
    pub async fn calculate_centroid(&self, ids: &[Uuid]) -> AnimaResult<CentroidResult> {
        if ids.is_empty() {
            return Err(AnimaError::EmptyCluster);
        }

        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "SELECT id, embedding, resonance_phi FROM memories
             WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        let members: Vec<WeightedMember> = result
            .iter()
            .map(|r| {
                let embedding: Vector = r.try_get("embedding").map_err(map_sqlx)?;
                Ok(WeightedMember {
                    id: r.try_get("id").map_err(map_sqlx)?,
                    embedding: embedding.to_vec(),
                    resonance_phi: r.try_get("resonance_phi").map_err(map_sqlx)?,
                })
            })
            .collect::<AnimaResult<_>>()?;

        weighted_centroid(&members)
    }

    /// Deferred semantic re-check for a freshly added memory.
    ///
    /// Waits out a settle delay so concurrent adds land, then merges this
    /// memory with its nearest live duplicate — newer into older, soft
    /// deleting the newer row. Re-checks are coalesced per memory id.
    pub async fn deferred_recheck(&self, memory_id: Uuid) -> AnimaResult<()> {
        if !self.in_flight.insert(memory_id) {
            debug!(memory_id = %memory_id, "re-check already in flight, coalescing");
            return Ok(());
        }
        let result = self.recheck_inner(memory_id).await;
        self.in_flight.remove(&memory_id);
        result
    }

    async fn recheck_inner(&self, memory_id: Uuid) -> AnimaResult<()> {
        tokio::time::sleep(Duration::from_millis(RECHECK_SETTLE_DELAY_MS)).await;

        let Some(subject) = self.fetch_live(memory_id).await? else {
            return Ok(());
        };

        let Some(duplicate) = self
            .find_duplicate_excluding(
                &subject.embedding,
                SEMANTIC_DUPLICATE_THRESHOLD,
                Some(memory_id),
            )
            .await?
        else {
            return Ok(());
        };

        let Some(other) = self.fetch_live(duplicate.id).await? else {
            return Ok(());
        };

        // Newer merges into older; the older row keeps its identity.
        let (older, newer) = if other.created_at <= subject.created_at {
            (other, subject)
        } else {
            (subject, other)
        };

        self.merge_into_centroid(
            older.id,
            &newer.content,
            newer.is_catalyst,
            duplicate.similarity,
        )
        .await?;
        self.soft_delete(newer.id).await?;

        info!(
            kept = %older.id,
            absorbed = %newer.id,
            similarity = duplicate.similarity,
            "deferred re-check consolidated concurrent duplicates"
        );
        Ok(())
    }

    async fn fetch_live(&self, id: Uuid) -> AnimaResult<Option<Memory>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query("SELECT * FROM memories WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(rows::memory_from_row).transpose()
    }

    async fn soft_delete(&self, id: Uuid) -> AnimaResult<()> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "UPDATE memories SET deleted_at = now(), updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            warn!(memory_id = %id, "soft delete hit an already-deleted row");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalyst_merges_contribute_more() {
        assert_eq!(merge_phi_increment(true, 0.99), 1.0);
        assert_eq!(merge_phi_increment(false, 0.99), 0.1);
    }

    #[test]
    fn low_similarity_merges_are_damped() {
        assert!((merge_phi_increment(true, 0.95) - 0.9).abs() < 1e-9);
        assert!((merge_phi_increment(false, 0.95) - 0.09).abs() < 1e-9);
    }

    #[test]
    fn full_scale_at_the_boundary() {
        assert_eq!(merge_phi_increment(true, PHI_MERGE_FULL_SCALE_SIMILARITY), 1.0);
    }
}
