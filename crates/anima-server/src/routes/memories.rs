//! Memory routes: add, query, bootstrap, update-tier.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use anima_core::constants::{DEFAULT_BOOTSTRAP_LIMIT, DEFAULT_QUERY_LIMIT, DEFAULT_SIMILARITY_THRESHOLD};
use anima_core::models::memory::{Memory, Tier};
use anima_core::models::promotion::{Promotion, PromotionReason, TierPromotion};
use anima_core::models::query::ScoredMemory;
use anima_core::models::{BootstrapFiltering, BootstrapOptions, QueryOptions, TierDistribution};
use anima_memory::AddOptions;

use crate::envelope::{success, success_timed, ApiError};
use crate::routes::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBody {
    pub content: String,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub conversation_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub is_catalyst: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPayload {
    pub memory: Memory,
    pub is_duplicate: bool,
    pub exact_match: bool,
    pub is_merged: bool,
    pub embedding_provider: String,
}

pub async fn add(
    State(engine): State<AppState>,
    Json(body): Json<AddBody>,
) -> Result<Response, ApiError> {
    let result = engine
        .memory
        .add(
            &body.content,
            AddOptions {
                category: body.category,
                tags: body.tags,
                source: body.source,
                conversation_id: body.conversation_id,
                metadata: body.metadata,
                is_catalyst: body.is_catalyst,
            },
        )
        .await?;

    let status = if result.is_duplicate || result.is_merged {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok(success(
        status,
        AddPayload {
            memory: result.memory,
            is_duplicate: result.is_duplicate,
            exact_match: result.exact_match,
            is_merged: result.is_merged,
            embedding_provider: result.embedding_provider,
        },
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryBody {
    pub query: String,
    pub limit: Option<i64>,
    pub similarity_threshold: Option<f64>,
    pub tiers: Option<Vec<Tier>>,
    pub conversation_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub memories: Vec<ScoredMemory>,
    pub query_time: u64,
    pub embedding_provider: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub promotions: Vec<Promotion>,
}

pub async fn query(
    State(engine): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Response, ApiError> {
    let opts = QueryOptions {
        limit: body.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
        threshold: body.similarity_threshold.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
        tiers: body.tiers.unwrap_or_default(),
        conversation_id: body.conversation_id,
    };
    let result = engine.memory.query(&body.query, opts).await?;
    let query_time = result.query_time_ms;

    Ok(success_timed(
        StatusCode::OK,
        QueryPayload {
            memories: result.memories,
            query_time,
            embedding_provider: result.embedding_provider,
            promotions: result.promotions,
        },
        Some(query_time),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapParams {
    pub conversation_id: Option<String>,
    pub limit: Option<i64>,
    pub include_active: Option<bool>,
    pub include_thread: Option<bool>,
    pub include_stable: Option<bool>,
}

#[derive(Serialize)]
pub struct BootstrapMemories {
    pub active: Vec<Memory>,
    pub thread: Vec<Memory>,
    pub stable: Vec<Memory>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostHandshake {
    pub id: Uuid,
    pub prompt_text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub is_existing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub context_type: &'static str,
    pub cached_for: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapPayload {
    pub memories: BootstrapMemories,
    pub distribution: TierDistribution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub filtering: BootstrapFiltering,
    pub ghost_handshake: GhostHandshake,
}

pub async fn bootstrap(
    State(engine): State<AppState>,
    Query(params): Query<BootstrapParams>,
) -> Result<Response, ApiError> {
    let opts = BootstrapOptions {
        conversation_id: params.conversation_id,
        limit: params.limit.unwrap_or(DEFAULT_BOOTSTRAP_LIMIT),
        include_active: params.include_active.unwrap_or(true),
        include_thread: params.include_thread.unwrap_or(true),
        include_stable: params.include_stable.unwrap_or(true),
    };
    let result = engine.bootstrap(&opts).await?;
    let handshake = result.handshake;

    Ok(success(
        StatusCode::OK,
        BootstrapPayload {
            memories: BootstrapMemories {
                active: result.active,
                thread: result.thread,
                stable: result.stable,
            },
            distribution: result.distribution,
            conversation_id: result.conversation_id,
            filtering: result.filtering,
            ghost_handshake: GhostHandshake {
                id: handshake.id,
                prompt_text: handshake.prompt_text,
                created_at: handshake.created_at,
                is_existing: handshake.is_existing,
                conversation_id: handshake.conversation_id,
                context_type: handshake.context_type.as_str(),
                cached_for: handshake.cached_for_ms,
            },
        },
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTierBody {
    pub memory_id: Uuid,
    pub tier: String,
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct UpdateTierPayload {
    pub memory: Memory,
    pub promotion: TierPromotion,
    pub message: String,
}

pub async fn update_tier(
    State(engine): State<AppState>,
    Json(body): Json<UpdateTierBody>,
) -> Result<Response, ApiError> {
    let tier = Tier::parse(&body.tier)?;
    let reason = body
        .reason
        .as_deref()
        .map(PromotionReason::parse)
        .transpose()?
        .unwrap_or(PromotionReason::Manual);

    let (memory, promotion) = engine.memory.update_tier(body.memory_id, tier, reason).await?;
    let message = format!(
        "memory {} moved from {} to {}",
        memory.id, promotion.from_tier, promotion.to_tier
    );
    Ok(success(
        StatusCode::OK,
        UpdateTierPayload {
            memory,
            promotion,
            message,
        },
    ))
}
