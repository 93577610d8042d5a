//! Reflection persistence.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use anima_core::errors::{AnimaError, AnimaResult};
use anima_core::models::reflection::{HubSummary, Reflection, ReflectionType, SessionMetrics};
use anima_associations::AssociationEngine;
use anima_storage::{map_sqlx, rows, StoragePool};

use crate::metrics::{compute_metrics, derive_insights};

/// How many hubs feed the reflection hub block.
const HUB_BLOCK_SIZE: i64 = 5;

pub struct ReflectionRecorder {
    pool: StoragePool,
    associations: Arc<AssociationEngine>,
}

impl ReflectionRecorder {
    pub fn new(pool: StoragePool, associations: Arc<AssociationEngine>) -> Self {
        Self { pool, associations }
    }

    /// Compute metrics, derive insights, persist the reflection.
    pub async fn record(
        &self,
        reflection_type: ReflectionType,
        conversation_id: Option<&str>,
        session: &SessionMetrics,
    ) -> AnimaResult<Reflection> {
        // The hub block is informative, not load-bearing: an empty graph
        // is fine.
        let hubs: Vec<HubSummary> = self
            .associations
            .hubs(HUB_BLOCK_SIZE, 1)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|h| HubSummary {
                memory_id: h.memory_id,
                connections: h.connections,
                total_strength: h.total_strength,
            })
            .collect();

        let metrics = compute_metrics(session, hubs);
        let (insights, recommendations) = derive_insights(&metrics);

        let metrics_json = serde_json::to_value(&metrics)
            .map_err(|e| AnimaError::internal(format!("metrics serialisation: {e}")))?;

        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            "INSERT INTO meta_reflections \
             (id, reflection_type, conversation_id, metrics, insights, recommendations) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(reflection_type.as_str())
        .bind(conversation_id)
        .bind(&metrics_json)
        .bind(&insights)
        .bind(&recommendations)
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        let reflection = rows::reflection_from_row(&row)?;
        info!(
            reflection_id = %reflection.id,
            kind = reflection_type.as_str(),
            "reflection recorded"
        );
        Ok(reflection)
    }

    /// Query reflections, newest first.
    pub async fn reflections(
        &self,
        conversation_id: Option<&str>,
        reflection_type: Option<ReflectionType>,
        limit: i64,
    ) -> AnimaResult<Vec<Reflection>> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "SELECT * FROM meta_reflections \
             WHERE ($1::text IS NULL OR conversation_id = $1) \
               AND ($2::text IS NULL OR reflection_type = $2) \
             ORDER BY created_at DESC \
             LIMIT $3",
        )
        .bind(conversation_id)
        .bind(reflection_type.map(|t| t.as_str()))
        .bind(limit.max(1))
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?;

        result.iter().map(rows::reflection_from_row).collect()
    }
}
