//! Batched co-occurrence upserts and graph lookups.

use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use anima_core::constants::STRENGTH_DIVISOR;
use anima_core::errors::{AnimaError, AnimaResult};
use anima_core::models::association::{all_pairs, strength_for_count};
use anima_core::models::{Association, AssociationView, HubView, NetworkStats};
use anima_storage::{batch, map_sqlx, retry_once, rows, StoragePool};

pub struct AssociationEngine {
    pool: StoragePool,
}

impl AssociationEngine {
    pub fn new(pool: StoragePool) -> Self {
        Self { pool }
    }

    /// Upsert all C(N,2) pairs for one query's result set.
    ///
    /// Pairs are chunked so each statement stays under the batch cap; a
    /// failed chunk is logged and skipped — the query that produced the
    /// co-occurrence has already returned, so nothing can propagate.
    /// Returns the number of pairs upserted.
    pub async fn record_co_occurrences(
        &self,
        ids: &[Uuid],
        conversation_id: Option<&str>,
    ) -> AnimaResult<usize> {
        let pairs = all_pairs(ids);
        if pairs.is_empty() {
            return Ok(0);
        }

        let contexts: Vec<String> = conversation_id
            .map(|c| vec![c.to_string()])
            .unwrap_or_default();
        let initial_strength = strength_for_count(1);
        let mut upserted = 0;

        for chunk in batch::chunks(&pairs) {
            // Upserts are safe to retry once; after that a failed chunk
            // is logged and skipped so its siblings still commit.
            match retry_once(|| self.upsert_chunk(chunk, &contexts, initial_strength)).await {
                Ok(()) => upserted += chunk.len(),
                Err(e) => {
                    warn!(
                        pairs = chunk.len(),
                        error = %e,
                        "co-occurrence chunk failed, continuing"
                    );
                }
            }
        }

        debug!(pairs = upserted, "recorded co-occurrences");
        Ok(upserted)
    }

    async fn upsert_chunk(
        &self,
        chunk: &[(Uuid, Uuid)],
        contexts: &[String],
        initial_strength: f64,
    ) -> AnimaResult<()> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO memory_associations \
             (memory_a, memory_b, co_occurrence_count, strength, conversation_contexts) ",
        );
        builder.push_values(chunk, |mut row, (a, b)| {
            row.push_bind(a)
                .push_bind(b)
                .push_bind(1i64)
                .push_bind(initial_strength)
                .push_bind(contexts);
        });
        builder.push(
            " ON CONFLICT (memory_a, memory_b) DO UPDATE SET \
             co_occurrence_count = memory_associations.co_occurrence_count + 1, \
             strength = LEAST(ln(1 + memory_associations.co_occurrence_count + 1) / ",
        );
        builder.push_bind(STRENGTH_DIVISOR);
        builder.push(
            ", 1.0), \
             last_co_occurred_at = now(), \
             conversation_contexts = \
               memory_associations.conversation_contexts || EXCLUDED.conversation_contexts",
        );

        let mut conn = self.pool.acquire().await?;
        builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    /// The edge between two memories, if one exists. Order of the ids
    /// does not matter; the canonical pair is looked up.
    pub async fn between(&self, x: Uuid, y: Uuid) -> AnimaResult<Option<Association>> {
        let (a, b) = Association::ordered_pair(x, y);
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            "SELECT * FROM memory_associations WHERE memory_a = $1 AND memory_b = $2",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(rows::association_from_row).transpose()
    }

    /// Associations of one memory, strongest first. An idempotent read,
    /// retried once on transient failure.
    pub async fn discover(
        &self,
        memory_id: Uuid,
        min_strength: f64,
        limit: i64,
    ) -> AnimaResult<Vec<AssociationView>> {
        retry_once(|| self.discover_once(memory_id, min_strength, limit)).await
    }

    async fn discover_once(
        &self,
        memory_id: Uuid,
        min_strength: f64,
        limit: i64,
    ) -> AnimaResult<Vec<AssociationView>> {
        self.ensure_memory_exists(memory_id).await?;
        let mut conn = self.pool.acquire().await?;

        let result = sqlx::query(
            r#"
            SELECT CASE WHEN a.memory_a = $1 THEN a.memory_b ELSE a.memory_a END AS partner_id,
                   m.content,
                   a.strength,
                   a.co_occurrence_count,
                   a.last_co_occurred_at
            FROM memory_associations a
            JOIN memories m
              ON m.id = CASE WHEN a.memory_a = $1 THEN a.memory_b ELSE a.memory_a END
            WHERE (a.memory_a = $1 OR a.memory_b = $1)
              AND a.strength >= $2
              AND m.deleted_at IS NULL
            ORDER BY a.strength DESC, a.last_co_occurred_at DESC
            LIMIT $3
            "#,
        )
        .bind(memory_id)
        .bind(min_strength)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        result
            .iter()
            .map(|r| {
                Ok(AssociationView {
                    memory_id: r.try_get("partner_id").map_err(map_sqlx)?,
                    content: r.try_get("content").map_err(map_sqlx)?,
                    strength: r.try_get("strength").map_err(map_sqlx)?,
                    co_occurrence_count: r.try_get("co_occurrence_count").map_err(map_sqlx)?,
                    last_co_occurred_at: r.try_get("last_co_occurred_at").map_err(map_sqlx)?,
                })
            })
            .collect()
    }

    /// Most connected live memories. Retried once on transient failure.
    pub async fn hubs(&self, limit: i64, min_connections: i64) -> AnimaResult<Vec<HubView>> {
        retry_once(|| self.hubs_once(limit, min_connections)).await
    }

    async fn hubs_once(&self, limit: i64, min_connections: i64) -> AnimaResult<Vec<HubView>> {
        let mut conn = self.pool.acquire().await?;

        let result = sqlx::query(
            r#"
            SELECT m.id, m.content, m.resonance_phi,
                   COUNT(*) AS connections,
                   SUM(e.strength) AS total_strength
            FROM memories m
            JOIN (
                SELECT memory_a AS id, strength FROM memory_associations
                UNION ALL
                SELECT memory_b AS id, strength FROM memory_associations
            ) e ON e.id = m.id
            WHERE m.deleted_at IS NULL
            GROUP BY m.id, m.content, m.resonance_phi
            HAVING COUNT(*) >= $2
            ORDER BY connections DESC, total_strength DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(min_connections)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        result
            .iter()
            .map(|r| {
                Ok(HubView {
                    memory_id: r.try_get("id").map_err(map_sqlx)?,
                    content: r.try_get("content").map_err(map_sqlx)?,
                    resonance_phi: r.try_get("resonance_phi").map_err(map_sqlx)?,
                    connections: r.try_get("connections").map_err(map_sqlx)?,
                    total_strength: r.try_get("total_strength").map_err(map_sqlx)?,
                })
            })
            .collect()
    }

    /// Network statistics around one memory.
    pub async fn network_stats(&self, memory_id: Uuid) -> AnimaResult<NetworkStats> {
        self.ensure_memory_exists(memory_id).await?;
        let mut conn = self.pool.acquire().await?;

        let aggregate = sqlx::query(
            r#"
            SELECT COUNT(*) AS degree,
                   COALESCE(SUM(strength), 0.0) AS total_strength,
                   COALESCE(AVG(strength), 0.0) AS avg_strength,
                   MIN(first_co_occurred_at) AS first_at,
                   MAX(last_co_occurred_at) AS last_at
            FROM memory_associations
            WHERE memory_a = $1 OR memory_b = $1
            "#,
        )
        .bind(memory_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        let strongest = sqlx::query(
            r#"
            SELECT CASE WHEN memory_a = $1 THEN memory_b ELSE memory_a END AS partner_id,
                   strength
            FROM memory_associations
            WHERE memory_a = $1 OR memory_b = $1
            ORDER BY strength DESC
            LIMIT 1
            "#,
        )
        .bind(memory_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        let (strongest_partner, strongest_strength) = match strongest {
            Some(r) => (
                Some(r.try_get("partner_id").map_err(map_sqlx)?),
                r.try_get("strength").map_err(map_sqlx)?,
            ),
            None => (None, 0.0),
        };

        Ok(NetworkStats {
            memory_id,
            degree: aggregate.try_get("degree").map_err(map_sqlx)?,
            total_strength: aggregate.try_get("total_strength").map_err(map_sqlx)?,
            avg_strength: aggregate.try_get("avg_strength").map_err(map_sqlx)?,
            strongest_partner,
            strongest_strength,
            first_association_at: aggregate.try_get("first_at").map_err(map_sqlx)?,
            last_association_at: aggregate.try_get("last_at").map_err(map_sqlx)?,
        })
    }

    async fn ensure_memory_exists(&self, memory_id: Uuid) -> AnimaResult<()> {
        let mut conn = self.pool.acquire().await?;
        let found = sqlx::query("SELECT 1 FROM memories WHERE id = $1 AND deleted_at IS NULL")
            .bind(memory_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx)?;
        if found.is_none() {
            return Err(AnimaError::not_found(format!("memory {memory_id}")));
        }
        Ok(())
    }
}
