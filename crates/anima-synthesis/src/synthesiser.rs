//! Handshake generation with the tiered ghost-log cache.

use chrono::{Duration, Utc};
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use anima_core::constants::{
    CONVERSATION_PHI_BOOST, HANDSHAKE_ANCHOR_PHI, HANDSHAKE_GLOBAL_WINDOW_SECS,
    HANDSHAKE_INVALIDATION_PHI, HANDSHAKE_MAX_ANCHORS, HANDSHAKE_PER_SESSION_WINDOW_SECS,
    HANDSHAKE_SELECTION_LIMIT, RECENCY_FLOOR, RECENCY_HORIZON_DAYS, SYNTHESIS_PHI_WEIGHT,
    SYNTHESIS_RECENCY_SCALE, SYNTHESIS_RECENCY_WEIGHT,
};
use anima_core::errors::AnimaResult;
use anima_core::models::handshake::{CacheReason, ContextType, Handshake, HandshakeRecord};
use anima_storage::{map_sqlx, retry_once, rows, StoragePool};

use crate::composer::{self, Anchor};
use crate::windows::choose_reason;

pub struct HandshakeSynthesiser {
    pool: StoragePool,
}

impl HandshakeSynthesiser {
    pub fn new(pool: StoragePool) -> Self {
        Self { pool }
    }

    /// Generate or reuse a handshake for the given key.
    ///
    /// A cached record is reused when its age sits inside the smallest
    /// applicable window and no significant state change happened since
    /// it was created. `force` always regenerates.
    pub async fn generate(
        &self,
        conversation_id: Option<&str>,
        force: bool,
    ) -> AnimaResult<Handshake> {
        if force {
            return self.generate_fresh(conversation_id, CacheReason::Force).await;
        }

        let now = Utc::now();
        if let Some(record) = self.newest_record(conversation_id).await? {
            let age_secs = (now - record.created_at).num_seconds();
            if let Some(reason) = choose_reason(age_secs, conversation_id.is_some()) {
                let invalidated = self
                    .significant_change_since(&record, conversation_id)
                    .await?;
                if !invalidated {
                    debug!(
                        handshake_id = %record.id,
                        reason = reason.as_str(),
                        age_secs,
                        "handshake cache hit"
                    );
                    return Ok(Handshake::existing(record, reason, now));
                }
                debug!(handshake_id = %record.id, "handshake invalidated by state change");
            }
        }

        let reason = if conversation_id.is_some() {
            CacheReason::PerConversation
        } else {
            CacheReason::GlobalFallback
        };
        self.generate_fresh(conversation_id, reason).await
    }

    /// A degraded handshake that never touches the database. Used by
    /// callers that must not fail when generation does.
    pub fn minimal(&self, conversation_id: Option<&str>) -> Handshake {
        let record = HandshakeRecord {
            id: Uuid::new_v4(),
            prompt_text: composer::minimal_preamble(),
            top_phi_memories: Vec::new(),
            top_phi_values: Vec::new(),
            conversation_id: conversation_id.map(str::to_string),
            context_type: if conversation_id.is_some() {
                ContextType::Conversation
            } else {
                ContextType::Global
            },
            created_at: Utc::now(),
            expires_at: None,
        };
        Handshake::fresh(record, CacheReason::Force)
    }

    /// Newest ghost-log record for the cache key. An idempotent read,
    /// retried once on transient failure.
    async fn newest_record(
        &self,
        conversation_id: Option<&str>,
    ) -> AnimaResult<Option<HandshakeRecord>> {
        retry_once(|| self.newest_record_once(conversation_id)).await
    }

    async fn newest_record_once(
        &self,
        conversation_id: Option<&str>,
    ) -> AnimaResult<Option<HandshakeRecord>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            "SELECT * FROM ghost_logs \
             WHERE ($1::text IS NULL AND conversation_id IS NULL) \
                OR ($1::text IS NOT NULL AND conversation_id = $1) \
             ORDER BY created_at DESC \
             LIMIT 1",
        )
        .bind(conversation_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        row.as_ref().map(rows::handshake_from_row).transpose()
    }

    /// Whether a cache-invalidating memory landed after the record: a
    /// catalyst in the same conversation, or any memory at or above the
    /// invalidation φ.
    async fn significant_change_since(
        &self,
        record: &HandshakeRecord,
        conversation_id: Option<&str>,
    ) -> AnimaResult<bool> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            "SELECT EXISTS ( \
                 SELECT 1 FROM memories \
                 WHERE deleted_at IS NULL \
                   AND created_at > $1 \
                   AND ((is_catalyst AND $2::text IS NOT NULL AND conversation_id = $2) \
                     OR resonance_phi >= $3) \
             ) AS changed",
        )
        .bind(record.created_at)
        .bind(conversation_id)
        .bind(HANDSHAKE_INVALIDATION_PHI)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        row.try_get("changed").map_err(map_sqlx)
    }

    /// Select anchors, compose the preamble, persist the ghost log.
    async fn generate_fresh(
        &self,
        conversation_id: Option<&str>,
        reason: CacheReason,
    ) -> AnimaResult<Handshake> {
        let mut anchors = self.select_anchors(conversation_id).await?;

        // The synthesis weight can rank a burst of fresh low-φ memories
        // above an older high-φ one. The output contract still requires
        // a high-φ anchor whenever one exists, so pull the strongest one
        // into the composed window.
        if !composer::has_high_phi_anchor(&anchors) {
            if let Some(anchor) = self.strongest_high_phi_anchor().await? {
                debug!(
                    memory_id = %anchor.id,
                    phi = anchor.resonance_phi,
                    "pulling high-phi anchor into the handshake"
                );
                let slot = anchors.len().min(HANDSHAKE_MAX_ANCHORS - 1);
                anchors.insert(slot, anchor);
                anchors.truncate(HANDSHAKE_SELECTION_LIMIT as usize);
            }
        }

        let thread_count = self.live_thread_count().await?;
        let lead = self.freshest_insight().await?;

        let prompt_text = composer::compose(&anchors, thread_count, lead.as_deref());
        let top_phi_memories: Vec<Uuid> = anchors.iter().map(|a| a.id).collect();
        let top_phi_values: Vec<f64> = anchors.iter().map(|a| a.resonance_phi).collect();

        let context_type = if conversation_id.is_some() {
            ContextType::Conversation
        } else {
            ContextType::Global
        };
        let window_secs = if conversation_id.is_some() {
            HANDSHAKE_PER_SESSION_WINDOW_SECS
        } else {
            HANDSHAKE_GLOBAL_WINDOW_SECS
        };
        let expires_at = Utc::now() + Duration::seconds(window_secs);

        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            "INSERT INTO ghost_logs \
             (id, prompt_text, top_phi_memories, top_phi_values, conversation_id, \
              context_type, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&prompt_text)
        .bind(&top_phi_memories)
        .bind(&top_phi_values)
        .bind(conversation_id)
        .bind(context_type.as_str())
        .bind(expires_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        let record = rows::handshake_from_row(&row)?;

        info!(
            handshake_id = %record.id,
            anchors = record.top_phi_memories.len(),
            context = context_type.as_str(),
            "handshake generated"
        );
        Ok(Handshake::fresh(record, reason))
    }

    /// Top memories by synthesis weight: φ (doubled for the matching
    /// conversation, read-only) blended with linear 30-day recency.
    async fn select_anchors(&self, conversation_id: Option<&str>) -> AnimaResult<Vec<Anchor>> {
        let horizon_secs = (RECENCY_HORIZON_DAYS * 86_400) as f64;
        let mut conn = self.pool.acquire().await?;

        let result = sqlx::query(
            r#"
            SELECT id, content, resonance_phi, is_catalyst,
                   CASE WHEN $1::text IS NOT NULL AND conversation_id = $1
                        THEN resonance_phi * $2
                        ELSE resonance_phi END AS effective_phi,
                   GREATEST($4,
                       1.0 - EXTRACT(EPOCH FROM (now() - last_accessed_at)) / $3) AS recency
            FROM memories
            WHERE deleted_at IS NULL
            ORDER BY
                (CASE WHEN $1::text IS NOT NULL AND conversation_id = $1
                      THEN resonance_phi * $2
                      ELSE resonance_phi END) * $5
                + GREATEST($4,
                      1.0 - EXTRACT(EPOCH FROM (now() - last_accessed_at)) / $3)
                  * $6 * $7 DESC
            LIMIT $8
            "#,
        )
        .bind(conversation_id)
        .bind(CONVERSATION_PHI_BOOST)
        .bind(horizon_secs)
        .bind(RECENCY_FLOOR)
        .bind(SYNTHESIS_PHI_WEIGHT)
        .bind(SYNTHESIS_RECENCY_SCALE)
        .bind(SYNTHESIS_RECENCY_WEIGHT)
        .bind(HANDSHAKE_SELECTION_LIMIT)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        result
            .iter()
            .map(|r| {
                Ok(Anchor {
                    id: r.try_get("id").map_err(map_sqlx)?,
                    content: r.try_get("content").map_err(map_sqlx)?,
                    resonance_phi: r.try_get("resonance_phi").map_err(map_sqlx)?,
                    is_catalyst: r.try_get("is_catalyst").map_err(map_sqlx)?,
                })
            })
            .collect()
    }

    /// The single strongest live memory at or above the anchor φ, for
    /// the corrective pull when weight ranking leaves all of them out.
    async fn strongest_high_phi_anchor(&self) -> AnimaResult<Option<Anchor>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            "SELECT id, content, resonance_phi, is_catalyst FROM memories \
             WHERE deleted_at IS NULL AND resonance_phi >= $1 \
             ORDER BY resonance_phi DESC \
             LIMIT 1",
        )
        .bind(HANDSHAKE_ANCHOR_PHI)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| {
            Ok(Anchor {
                id: r.try_get("id").map_err(map_sqlx)?,
                content: r.try_get("content").map_err(map_sqlx)?,
                resonance_phi: r.try_get("resonance_phi").map_err(map_sqlx)?,
                is_catalyst: r.try_get("is_catalyst").map_err(map_sqlx)?,
            })
        })
        .transpose()
    }

    async fn live_thread_count(&self) -> AnimaResult<i64> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM memories \
             WHERE deleted_at IS NULL AND tier = 'thread'",
        )
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx)?;
        row.try_get("n").map_err(map_sqlx)
    }

    /// First insight of the freshest reflection, for the lead clause.
    async fn freshest_insight(&self) -> AnimaResult<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            "SELECT insights[1] AS lead FROM meta_reflections \
             WHERE cardinality(insights) > 0 \
             ORDER BY created_at DESC \
             LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await;

        match row {
            Ok(Some(row)) => Ok(row.try_get("lead").unwrap_or(None)),
            Ok(None) => Ok(None),
            Err(e) => {
                // The lead clause is decoration; never fail generation
                // because reflections are unavailable.
                warn!(error = %e, "freshest insight lookup failed");
                Ok(None)
            }
        }
    }
}
