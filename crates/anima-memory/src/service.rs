//! The memory service: add, query, bootstrap, update-tier.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use pgvector::Vector;
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use anima_core::constants::{
    BOOTSTRAP_THREAD_SHARE, CATALYST_INITIAL_PHI, CONVERSATION_PHI_BOOST, GLOBAL_PHI_FLOOR,
    PHI_QUERY_INCREMENT, RESONANCE_WEIGHT, SEMANTIC_DUPLICATE_THRESHOLD, SIMILARITY_WEIGHT,
};
use anima_core::errors::{AnimaError, AnimaResult};
use anima_core::models::memory::{clamp_phi, Memory, Tier};
use anima_core::models::promotion::{PromotionReason, TierPromotion};
use anima_core::models::query::ScoredMemory;
use anima_core::models::{
    AddResult, BootstrapFiltering, BootstrapOptions, Promotion, QueryOptions, QueryResult,
    TierDistribution,
};
use anima_consolidation::Consolidator;
use anima_embeddings::EmbeddingGateway;
use anima_storage::{map_sqlx, rows, StoragePool};

use crate::jobs::{Job, JobQueue};
use crate::tiers;

/// Optional attributes for a new memory.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub conversation_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub is_catalyst: bool,
}

/// Bootstrap output before the handshake is attached: the three tier
/// lists plus the distribution summary.
#[derive(Debug, Clone)]
pub struct TierSlices {
    pub active: Vec<Memory>,
    pub thread: Vec<Memory>,
    pub stable: Vec<Memory>,
    pub distribution: TierDistribution,
    pub conversation_id: Option<String>,
    pub filtering: BootstrapFiltering,
}

pub struct MemoryService {
    pool: StoragePool,
    gateway: Arc<EmbeddingGateway>,
    consolidator: Arc<Consolidator>,
    jobs: JobQueue,
    semantic_consolidation: bool,
}

impl MemoryService {
    pub fn new(
        pool: StoragePool,
        gateway: Arc<EmbeddingGateway>,
        consolidator: Arc<Consolidator>,
        jobs: JobQueue,
        semantic_consolidation: bool,
    ) -> Self {
        Self {
            pool,
            gateway,
            consolidator,
            jobs,
            semantic_consolidation,
        }
    }

    /// Add a memory: semantic merge, exact dedup, or fresh insert.
    pub async fn add(&self, content: &str, opts: AddOptions) -> AnimaResult<AddResult> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AnimaError::validation("content must be non-empty"));
        }
        let fingerprint = Memory::fingerprint(content);
        let embedded = self.gateway.embed(content).await?;

        // Synchronous consolidation on the fast path when enabled.
        if self.semantic_consolidation {
            if let Some(duplicate) = self
                .consolidator
                .find_semantic_duplicate(&embedded.vector, SEMANTIC_DUPLICATE_THRESHOLD)
                .await?
            {
                let merged = self
                    .consolidator
                    .merge_into_centroid(
                        duplicate.id,
                        content,
                        opts.is_catalyst,
                        duplicate.similarity,
                    )
                    .await?;
                return Ok(AddResult {
                    memory: merged.memory,
                    is_duplicate: false,
                    exact_match: false,
                    is_merged: true,
                    embedding_provider: embedded.provider,
                });
            }
        }

        // Exact dedup by fingerprint.
        if let Some(existing) = self.bump_existing(&fingerprint).await? {
            return Ok(AddResult {
                memory: existing,
                is_duplicate: true,
                exact_match: true,
                is_merged: false,
                embedding_provider: embedded.provider,
            });
        }

        let memory = self
            .insert_new(content, &fingerprint, &embedded.vector, &opts)
            .await?;

        // A concurrent add can win the fingerprint race; fold into dedup.
        let Some(memory) = memory else {
            let existing = self
                .bump_existing(&fingerprint)
                .await?
                .ok_or_else(|| AnimaError::internal("duplicate vanished during add"))?;
            return Ok(AddResult {
                memory: existing,
                is_duplicate: true,
                exact_match: true,
                is_merged: false,
                embedding_provider: embedded.provider,
            });
        };

        // Fire-and-forget follow-ups; neither blocks the response.
        if self.semantic_consolidation {
            self.jobs.submit(Job::SemanticRecheck {
                memory_id: memory.id,
            });
        }
        if !memory.is_catalyst {
            self.jobs.submit(Job::CatalystProbe {
                memory_id: memory.id,
            });
        }

        info!(memory_id = %memory.id, catalyst = memory.is_catalyst, "memory added");
        Ok(AddResult {
            memory,
            is_duplicate: false,
            exact_match: false,
            is_merged: false,
            embedding_provider: embedded.provider,
        })
    }

    async fn bump_existing(&self, fingerprint: &str) -> AnimaResult<Option<Memory>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            "UPDATE memories \
             SET access_count = access_count + 1, last_accessed_at = now(), updated_at = now() \
             WHERE content_fingerprint = $1 AND deleted_at IS NULL \
             RETURNING *",
        )
        .bind(fingerprint)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(rows::memory_from_row).transpose()
    }

    async fn insert_new(
        &self,
        content: &str,
        fingerprint: &str,
        embedding: &[f32],
        opts: &AddOptions,
    ) -> AnimaResult<Option<Memory>> {
        let phi = if opts.is_catalyst {
            CATALYST_INITIAL_PHI
        } else {
            0.0
        };
        let metadata = opts
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query(
            "INSERT INTO memories \
             (id, content, content_fingerprint, embedding, tier, resonance_phi, is_catalyst, \
              category, tags, source, conversation_id, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (content_fingerprint) WHERE deleted_at IS NULL DO NOTHING \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(content)
        .bind(fingerprint)
        .bind(Vector::from(embedding.to_vec()))
        .bind(Tier::Active.as_str())
        .bind(phi)
        .bind(opts.is_catalyst)
        .bind(&opts.category)
        .bind(&opts.tags)
        .bind(&opts.source)
        .bind(&opts.conversation_id)
        .bind(&metadata)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        row.as_ref().map(rows::memory_from_row).transpose()
    }

    /// Semantic query with access bookkeeping and promotions.
    pub async fn query(&self, text: &str, opts: QueryOptions) -> AnimaResult<QueryResult> {
        let started = Instant::now();
        let opts = opts.normalised();

        if opts.limit <= 0 {
            return Ok(QueryResult {
                memories: Vec::new(),
                promotions: Vec::new(),
                query_time_ms: started.elapsed().as_millis() as u64,
                embedding_provider: self.gateway.primary_provider().to_string(),
            });
        }

        let embedded = self.gateway.embed(text).await?;
        let vector = Vector::from(embedded.vector.clone());
        let tier_filter: Vec<String> = opts.tiers.iter().map(|t| t.as_str().to_string()).collect();

        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            SELECT *, 1 - (embedding <=> $1) AS similarity
            FROM memories
            WHERE deleted_at IS NULL
              AND 1 - (embedding <=> $1) >= $2
              AND (cardinality($3::text[]) = 0 OR tier = ANY($3))
            ORDER BY (1 - (embedding <=> $1)) * $5 + (resonance_phi / 5.0) * $6 DESC,
                     resonance_phi DESC
            LIMIT $4
            "#,
        )
        .bind(&vector)
        .bind(opts.threshold)
        .bind(&tier_filter)
        .bind(opts.limit)
        .bind(SIMILARITY_WEIGHT)
        .bind(RESONANCE_WEIGHT)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        drop(conn);

        let mut scored: Vec<ScoredMemory> = result
            .iter()
            .map(|r| {
                Ok(ScoredMemory {
                    memory: rows::memory_from_row(r)?,
                    similarity: r.try_get("similarity").map_err(map_sqlx)?,
                })
            })
            .collect::<AnimaResult<_>>()?;

        if scored.is_empty() {
            return Ok(QueryResult {
                memories: scored,
                promotions: Vec::new(),
                query_time_ms: started.elapsed().as_millis() as u64,
                embedding_provider: embedded.provider,
            });
        }

        let ids: Vec<Uuid> = scored.iter().map(|s| s.memory.id).collect();
        self.record_access(&ids, opts.conversation_id.as_deref())
            .await?;
        let promotions = self.apply_promotions(&ids).await?;

        // Mirror the bookkeeping into the rows we return.
        let now = Utc::now();
        for s in &mut scored {
            s.memory.access_count += 1;
            s.memory.last_accessed_at = now;
            s.memory.resonance_phi = clamp_phi(s.memory.resonance_phi + PHI_QUERY_INCREMENT);
            if let Some(p) = promotions.iter().find(|p| p.memory_id == s.memory.id) {
                s.memory.tier = p.to_tier;
                s.memory.tier_updated_at = now;
            }
        }

        // Co-occurrence recording happens off the response path.
        if ids.len() >= 2 {
            self.jobs.submit(Job::RecordCoOccurrences {
                memory_ids: ids,
                conversation_id: opts.conversation_id.clone(),
            });
        }

        Ok(QueryResult {
            memories: scored,
            promotions,
            query_time_ms: started.elapsed().as_millis() as u64,
            embedding_provider: embedded.provider,
        })
    }

    /// One batched bookkeeping update for every returned memory.
    async fn record_access(&self, ids: &[Uuid], conversation_id: Option<&str>) -> AnimaResult<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"
            UPDATE memories
            SET access_count = access_count + 1,
                last_accessed_at = now(),
                resonance_phi = LEAST(resonance_phi + $2, 5.0),
                updated_at = now(),
                metadata = CASE
                    WHEN $3::text IS NULL THEN metadata
                    ELSE jsonb_set(
                        metadata,
                        '{visited_conversations}',
                        COALESCE(metadata->'visited_conversations', '[]'::jsonb)
                            || to_jsonb($3::text))
                END
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(PHI_QUERY_INCREMENT)
        .bind(conversation_id)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    /// Find promotion candidates on the post-increment counts, apply in
    /// one batched update, and audit.
    async fn apply_promotions(&self, ids: &[Uuid]) -> AnimaResult<Vec<Promotion>> {
        let mut conn = self.pool.acquire().await?;
        let candidates = sqlx::query(
            r#"
            SELECT id, tier, access_count,
                   EXTRACT(DAY FROM now() - last_accessed_at)::bigint AS days_idle
            FROM memories
            WHERE id = ANY($1)
              AND deleted_at IS NULL
              AND ((tier = 'active' AND access_count >= $2)
                OR (tier = 'thread' AND access_count >= $3))
            "#,
        )
        .bind(ids)
        .bind(anima_core::constants::THREAD_PROMOTION_THRESHOLD)
        .bind(anima_core::constants::STABLE_PROMOTION_THRESHOLD)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut changes = Vec::with_capacity(candidates.len());
        let mut promotions = Vec::with_capacity(candidates.len());
        for row in &candidates {
            let id: Uuid = row.try_get("id").map_err(map_sqlx)?;
            let tier: String = row.try_get("tier").map_err(map_sqlx)?;
            let tier = Tier::parse(&tier)?;
            let count: i64 = row.try_get("access_count").map_err(map_sqlx)?;
            let days: i64 = row.try_get("days_idle").map_err(map_sqlx)?;
            if let Some(target) = tiers::promotion_target(tier, count) {
                changes.push((id, tier, target, count, days));
                promotions.push(Promotion {
                    memory_id: id,
                    from_tier: tier,
                    to_tier: target,
                });
            }
        }

        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let promoted_ids: Vec<Uuid> = changes.iter().map(|c| c.0).collect();
        sqlx::query(
            r#"
            UPDATE memories
            SET tier = CASE
                    WHEN tier = 'active' THEN 'thread'
                    WHEN tier = 'thread' THEN 'stable'
                    ELSE tier
                END,
                tier_updated_at = now(),
                updated_at = now()
            WHERE id = ANY($1)
            "#,
        )
        .bind(&promoted_ids)
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        drop(conn);

        tiers::record_promotions(&self.pool, &changes, PromotionReason::AccessThreshold).await?;

        debug!(count = promotions.len(), "applied tier promotions");
        Ok(promotions)
    }

    /// Read-only tier bootstrap: one windowed SQL statement, no
    /// bookkeeping. Orientation reads must not look like usage.
    pub async fn bootstrap(&self, opts: &BootstrapOptions) -> AnimaResult<TierSlices> {
        let conversation = opts.conversation_id.clone();
        let mut conn = self.pool.acquire().await?;

        let result = sqlx::query(
            r#"
            WITH live AS (
                SELECT *,
                       CASE WHEN $1::text IS NOT NULL AND conversation_id = $1
                            THEN resonance_phi * $4
                            ELSE resonance_phi END AS effective_phi
                FROM memories
                WHERE deleted_at IS NULL
                  AND tier IN ('active', 'thread', 'stable')
                  AND ($1::text IS NULL OR conversation_id = $1 OR resonance_phi >= $5)
            ),
            caps AS (
                SELECT LEAST(COUNT(*) FILTER (WHERE tier = 'active'), $2::bigint) AS active_cap,
                       GREATEST($2::bigint
                           - LEAST(COUNT(*) FILTER (WHERE tier = 'active'), $2::bigint),
                           0) AS remaining
                FROM live
            ),
            ranked AS (
                SELECT live.*,
                       ROW_NUMBER() OVER (
                           PARTITION BY tier
                           ORDER BY
                               CASE WHEN tier = 'active' THEN last_accessed_at END
                                   DESC NULLS LAST,
                               effective_phi DESC,
                               last_accessed_at DESC
                       ) AS tier_rank
                FROM live
            )
            SELECT ranked.*
            FROM ranked, caps
            WHERE (tier = 'active' AND $6 AND tier_rank <= caps.active_cap)
               OR (tier = 'thread' AND $7 AND tier_rank <= ROUND(caps.remaining * $3))
               OR (tier = 'stable' AND $8
                   AND tier_rank <= caps.remaining - ROUND(caps.remaining * $3))
            ORDER BY tier, tier_rank
            "#,
        )
        .bind(&conversation)
        .bind(opts.limit.max(0))
        .bind(BOOTSTRAP_THREAD_SHARE)
        .bind(CONVERSATION_PHI_BOOST)
        .bind(GLOBAL_PHI_FLOOR)
        .bind(opts.include_active)
        .bind(opts.include_thread)
        .bind(opts.include_stable)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        let mut active = Vec::new();
        let mut thread = Vec::new();
        let mut stable = Vec::new();
        for row in &result {
            let memory = rows::memory_from_row(row)?;
            match memory.tier {
                Tier::Active => active.push(memory),
                Tier::Thread => thread.push(memory),
                Tier::Stable => stable.push(memory),
                Tier::Network => {}
            }
        }

        let distribution = TierDistribution {
            active: active.len(),
            thread: thread.len(),
            stable: stable.len(),
            total: active.len() + thread.len() + stable.len(),
        };

        Ok(TierSlices {
            active,
            thread,
            stable,
            distribution,
            filtering: BootstrapFiltering::for_conversation(conversation.is_some()),
            conversation_id: conversation,
        })
    }

    /// Manual tier update with an audit row.
    pub async fn update_tier(
        &self,
        memory_id: Uuid,
        new_tier: Tier,
        reason: PromotionReason,
    ) -> AnimaResult<(Memory, TierPromotion)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT tier, access_count, \
             EXTRACT(DAY FROM now() - last_accessed_at)::bigint AS days_idle \
             FROM memories WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(memory_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| AnimaError::not_found(format!("memory {memory_id}")))?;

        let from_tier: String = row.try_get("tier").map_err(map_sqlx)?;
        let from_tier = Tier::parse(&from_tier)?;
        let access_count: i64 = row.try_get("access_count").map_err(map_sqlx)?;
        let days_idle: i64 = row.try_get("days_idle").map_err(map_sqlx)?;

        let row = sqlx::query(
            "UPDATE memories SET tier = $2, tier_updated_at = now(), updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(memory_id)
        .bind(new_tier.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        let memory = rows::memory_from_row(&row)?;

        let row = sqlx::query(
            "INSERT INTO tier_promotions \
             (id, memory_id, from_tier, to_tier, reason, \
              access_count_at_promotion, days_since_last_access) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(memory_id)
        .bind(from_tier.as_str())
        .bind(new_tier.as_str())
        .bind(reason.as_str())
        .bind(access_count)
        .bind(days_idle)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        let promotion = rows::promotion_from_row(&row)?;

        tx.commit().await.map_err(map_sqlx)?;

        info!(
            memory_id = %memory_id,
            from = %promotion.from_tier,
            to = %promotion.to_tier,
            reason = reason.as_str(),
            "tier updated"
        );
        Ok((memory, promotion))
    }
}
