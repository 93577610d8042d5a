//! PgRow → model mapping.
//!
//! Kept here so `anima-core` stays driver-free. Column layouts match the
//! DDL in [`crate::schema`].

use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use anima_core::errors::{AnimaError, AnimaResult};
use anima_core::models::handshake::{ContextType, HandshakeRecord};
use anima_core::models::memory::{Memory, Tier};
use anima_core::models::promotion::{PromotionReason, TierPromotion};
use anima_core::models::reflection::{Reflection, ReflectionMetrics, ReflectionType};
use anima_core::models::Association;

fn get<'r, T>(row: &'r PgRow, column: &str) -> AnimaResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| AnimaError::database(format!("column {column}: {e}")))
}

/// Map a full `memories` row.
pub fn memory_from_row(row: &PgRow) -> AnimaResult<Memory> {
    let embedding: Vector = get(row, "embedding")?;
    let tier: String = get(row, "tier")?;
    Ok(Memory {
        id: get(row, "id")?,
        content: get(row, "content")?,
        content_fingerprint: get(row, "content_fingerprint")?,
        embedding: embedding.to_vec(),
        tier: Tier::parse(&tier)?,
        tier_updated_at: get(row, "tier_updated_at")?,
        resonance_phi: get(row, "resonance_phi")?,
        is_catalyst: get(row, "is_catalyst")?,
        access_count: get(row, "access_count")?,
        last_accessed_at: get(row, "last_accessed_at")?,
        category: get(row, "category")?,
        tags: get(row, "tags")?,
        source: get(row, "source")?,
        conversation_id: get(row, "conversation_id")?,
        metadata: get(row, "metadata")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        deleted_at: get(row, "deleted_at")?,
    })
}

/// Map a `memory_associations` row.
pub fn association_from_row(row: &PgRow) -> AnimaResult<Association> {
    Ok(Association {
        memory_a: get(row, "memory_a")?,
        memory_b: get(row, "memory_b")?,
        co_occurrence_count: get(row, "co_occurrence_count")?,
        strength: get(row, "strength")?,
        first_co_occurred_at: get(row, "first_co_occurred_at")?,
        last_co_occurred_at: get(row, "last_co_occurred_at")?,
        conversation_contexts: get(row, "conversation_contexts")?,
    })
}

/// Map a `tier_promotions` row.
pub fn promotion_from_row(row: &PgRow) -> AnimaResult<TierPromotion> {
    let from_tier: String = get(row, "from_tier")?;
    let to_tier: String = get(row, "to_tier")?;
    let reason: String = get(row, "reason")?;
    Ok(TierPromotion {
        id: get(row, "id")?,
        memory_id: get(row, "memory_id")?,
        from_tier: Tier::parse(&from_tier)?,
        to_tier: Tier::parse(&to_tier)?,
        reason: PromotionReason::parse(&reason)?,
        access_count_at_promotion: get(row, "access_count_at_promotion")?,
        days_since_last_access: get(row, "days_since_last_access")?,
        created_at: get(row, "created_at")?,
    })
}

/// Map a `meta_reflections` row.
pub fn reflection_from_row(row: &PgRow) -> AnimaResult<Reflection> {
    let reflection_type: String = get(row, "reflection_type")?;
    let metrics: serde_json::Value = get(row, "metrics")?;
    let metrics: ReflectionMetrics = serde_json::from_value(metrics)
        .map_err(|e| AnimaError::database(format!("reflection metrics: {e}")))?;
    Ok(Reflection {
        id: get(row, "id")?,
        reflection_type: ReflectionType::parse(&reflection_type)?,
        conversation_id: get(row, "conversation_id")?,
        metrics,
        insights: get(row, "insights")?,
        recommendations: get(row, "recommendations")?,
        created_at: get(row, "created_at")?,
    })
}

/// Map a `ghost_logs` row.
pub fn handshake_from_row(row: &PgRow) -> AnimaResult<HandshakeRecord> {
    let context_type: String = get(row, "context_type")?;
    let top_phi_memories: Vec<Uuid> = get(row, "top_phi_memories")?;
    let top_phi_values: Vec<f64> = get(row, "top_phi_values")?;
    Ok(HandshakeRecord {
        id: get(row, "id")?,
        prompt_text: get(row, "prompt_text")?,
        top_phi_memories,
        top_phi_values,
        conversation_id: get(row, "conversation_id")?,
        context_type: match context_type.as_str() {
            "conversation" => ContextType::Conversation,
            _ => ContextType::Global,
        },
        created_at: get(row, "created_at")?,
        expires_at: get(row, "expires_at")?,
    })
}
