//! Idempotent schema bootstrap.
//!
//! Creates the vector extension, the five tables, and every required
//! index at startup. DDL is `IF NOT EXISTS` throughout so restarts are
//! harmless. The embedding dimension is baked into the `memories` table
//! once per deployment.

use sqlx::Executor;
use tracing::info;

use anima_core::errors::AnimaResult;

use crate::error::map_sqlx;
use crate::pool::StoragePool;

/// Create schema objects for the given deployment dimension.
///
/// When `schema` is non-default the schema itself is created first; the
/// pool's `search_path` hook then routes all statements into it.
pub async fn ensure_schema(
    pool: &StoragePool,
    schema: Option<&str>,
    dimensions: usize,
) -> AnimaResult<()> {
    let mut conn = pool.acquire().await?;

    conn.execute("CREATE EXTENSION IF NOT EXISTS vector")
        .await
        .map_err(map_sqlx)?;

    if let Some(schema) = schema {
        conn.execute(format!("CREATE SCHEMA IF NOT EXISTS {schema}").as_str())
            .await
            .map_err(map_sqlx)?;
        conn.execute(format!("SET search_path TO {schema}, public").as_str())
            .await
            .map_err(map_sqlx)?;
    }

    let memories = format!(
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            id UUID PRIMARY KEY,
            content TEXT NOT NULL,
            content_fingerprint TEXT NOT NULL,
            embedding vector({dimensions}) NOT NULL,
            tier TEXT NOT NULL DEFAULT 'active',
            tier_updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            resonance_phi DOUBLE PRECISION NOT NULL DEFAULT 0.0
                CHECK (resonance_phi >= 0.0 AND resonance_phi <= 5.0),
            is_catalyst BOOLEAN NOT NULL DEFAULT FALSE,
            access_count BIGINT NOT NULL DEFAULT 0,
            last_accessed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            category TEXT,
            tags TEXT[] NOT NULL DEFAULT '{{}}',
            source TEXT,
            conversation_id TEXT,
            metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            deleted_at TIMESTAMPTZ
        )
        "#
    );
    conn.execute(memories.as_str()).await.map_err(map_sqlx)?;

    let ddl = [
        // Exact dedup among live rows only; soft-deleted rows free the slot.
        "CREATE UNIQUE INDEX IF NOT EXISTS memories_fingerprint_live
         ON memories (content_fingerprint) WHERE deleted_at IS NULL",
        "CREATE INDEX IF NOT EXISTS memories_embedding_hnsw
         ON memories USING hnsw (embedding vector_cosine_ops)
         WITH (m = 16, ef_construction = 64)",
        "CREATE INDEX IF NOT EXISTS memories_tier_phi_accessed
         ON memories (tier, resonance_phi DESC, last_accessed_at DESC)",
        "CREATE TABLE IF NOT EXISTS memory_associations (
            memory_a UUID NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            memory_b UUID NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            co_occurrence_count BIGINT NOT NULL DEFAULT 1,
            strength DOUBLE PRECISION NOT NULL DEFAULT 0.0,
            first_co_occurred_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            last_co_occurred_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            conversation_contexts TEXT[] NOT NULL DEFAULT '{}',
            PRIMARY KEY (memory_a, memory_b),
            CHECK (memory_a < memory_b)
        )",
        "CREATE INDEX IF NOT EXISTS associations_memory_a ON memory_associations (memory_a)",
        "CREATE INDEX IF NOT EXISTS associations_memory_b ON memory_associations (memory_b)",
        "CREATE INDEX IF NOT EXISTS associations_strength ON memory_associations (strength DESC)",
        "CREATE TABLE IF NOT EXISTS tier_promotions (
            id UUID PRIMARY KEY,
            memory_id UUID NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            from_tier TEXT NOT NULL,
            to_tier TEXT NOT NULL,
            reason TEXT NOT NULL,
            access_count_at_promotion BIGINT NOT NULL DEFAULT 0,
            days_since_last_access BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "CREATE INDEX IF NOT EXISTS tier_promotions_memory ON tier_promotions (memory_id)",
        "CREATE TABLE IF NOT EXISTS meta_reflections (
            id UUID PRIMARY KEY,
            reflection_type TEXT NOT NULL,
            conversation_id TEXT,
            metrics JSONB NOT NULL DEFAULT '{}'::jsonb,
            insights TEXT[] NOT NULL DEFAULT '{}',
            recommendations TEXT[] NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "CREATE INDEX IF NOT EXISTS reflections_conversation
         ON meta_reflections (conversation_id)",
        "CREATE TABLE IF NOT EXISTS ghost_logs (
            id UUID PRIMARY KEY,
            prompt_text TEXT NOT NULL,
            top_phi_memories UUID[] NOT NULL DEFAULT '{}',
            top_phi_values DOUBLE PRECISION[] NOT NULL DEFAULT '{}',
            conversation_id TEXT,
            context_type TEXT NOT NULL DEFAULT 'global',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            expires_at TIMESTAMPTZ
        )",
        "CREATE INDEX IF NOT EXISTS ghost_logs_conversation ON ghost_logs (conversation_id)",
    ];

    for stmt in ddl {
        conn.execute(stmt).await.map_err(map_sqlx)?;
    }

    info!(dimensions, schema = schema.unwrap_or("public"), "schema ready");
    Ok(())
}
