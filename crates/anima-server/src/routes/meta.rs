//! Meta routes: reflections, handshake, health, metrics.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use anima_core::errors::AnimaError;
use anima_core::models::handshake::Handshake;
use anima_core::models::reflection::{Reflection, ReflectionType, SessionMetrics};

use crate::envelope::{success, ApiError};
use crate::routes::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEndBody {
    pub conversation_id: String,
    #[serde(default)]
    pub session_metrics: SessionMetrics,
}

#[derive(Serialize)]
pub struct ReflectionPayload {
    pub reflection: Reflection,
}

pub async fn conversation_end(
    State(engine): State<AppState>,
    Json(body): Json<ConversationEndBody>,
) -> Result<Response, ApiError> {
    if body.conversation_id.trim().is_empty() {
        return Err(AnimaError::validation("conversationId must be non-empty").into());
    }
    let reflection = engine
        .reflections
        .record(
            ReflectionType::ConversationEnd,
            Some(&body.conversation_id),
            &body.session_metrics,
        )
        .await?;
    Ok(success(StatusCode::OK, ReflectionPayload { reflection }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionParams {
    pub conversation_id: Option<String>,
    pub limit: Option<i64>,
    pub reflection_type: Option<String>,
}

#[derive(Serialize)]
pub struct ReflectionsPayload {
    pub reflections: Vec<Reflection>,
    pub count: usize,
}

pub async fn reflections(
    State(engine): State<AppState>,
    Query(params): Query<ReflectionParams>,
) -> Result<Response, ApiError> {
    let reflection_type = params
        .reflection_type
        .as_deref()
        .map(ReflectionType::parse)
        .transpose()?;
    let reflections = engine
        .reflections
        .reflections(
            params.conversation_id.as_deref(),
            reflection_type,
            params.limit.unwrap_or(1),
        )
        .await?;
    Ok(success(
        StatusCode::OK,
        ReflectionsPayload {
            count: reflections.len(),
            reflections,
        },
    ))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateHandshakeBody {
    pub conversation_id: Option<String>,
    pub force: Option<bool>,
}

#[derive(Serialize)]
pub struct HandshakePayload {
    pub handshake: Handshake,
}

pub async fn generate_handshake(
    State(engine): State<AppState>,
    Json(body): Json<GenerateHandshakeBody>,
) -> Result<Response, ApiError> {
    let handshake = engine
        .handshake(body.conversation_id.as_deref(), body.force.unwrap_or(true))
        .await;
    Ok(success(StatusCode::OK, HandshakePayload { handshake }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHandshakeParams {
    pub conversation_id: Option<String>,
}

pub async fn get_handshake(
    State(engine): State<AppState>,
    Query(params): Query<GetHandshakeParams>,
) -> Result<Response, ApiError> {
    let handshake = engine
        .handshake(params.conversation_id.as_deref(), false)
        .await;
    Ok(success(StatusCode::OK, HandshakePayload { handshake }))
}

pub async fn health(State(engine): State<AppState>) -> Response {
    let report = engine.health().await;
    let status = if report.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    success(status, report)
}

pub async fn metrics(State(engine): State<AppState>) -> Response {
    success(StatusCode::OK, engine.metrics())
}

#[derive(Serialize)]
pub struct CacheStatsPayload {
    pub cache: anima_core::models::CacheStats,
    pub recommendation: String,
}

pub async fn cache_stats(State(engine): State<AppState>) -> Response {
    let cache = engine.gateway.cache_stats();
    let recommendation = cache.recommendation();
    success(
        StatusCode::OK,
        CacheStatsPayload {
            cache,
            recommendation,
        },
    )
}
