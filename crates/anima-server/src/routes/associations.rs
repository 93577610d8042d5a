//! Association routes: discover, hubs, network-stats.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use anima_core::models::{AssociationView, HubView, NetworkStats};

use crate::envelope::{success, ApiError};
use crate::routes::AppState;

const DEFAULT_MIN_STRENGTH: f64 = 0.1;
const DEFAULT_DISCOVER_LIMIT: i64 = 20;
const DEFAULT_HUB_LIMIT: i64 = 10;
const DEFAULT_MIN_CONNECTIONS: i64 = 5;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverParams {
    pub memory_id: Uuid,
    pub min_strength: Option<f64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct DiscoverPayload {
    pub memory_id: Uuid,
    pub associations: Vec<AssociationView>,
    pub total_associations: usize,
}

pub async fn discover(
    State(engine): State<AppState>,
    Query(params): Query<DiscoverParams>,
) -> Result<Response, ApiError> {
    let associations = engine
        .associations
        .discover(
            params.memory_id,
            params.min_strength.unwrap_or(DEFAULT_MIN_STRENGTH),
            params.limit.unwrap_or(DEFAULT_DISCOVER_LIMIT),
        )
        .await?;

    Ok(success(
        StatusCode::OK,
        DiscoverPayload {
            memory_id: params.memory_id,
            total_associations: associations.len(),
            associations,
        },
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubsParams {
    pub limit: Option<i64>,
    pub min_connections: Option<i64>,
}

#[derive(Serialize)]
pub struct HubsPayload {
    pub hubs: Vec<HubView>,
}

pub async fn hubs(
    State(engine): State<AppState>,
    Query(params): Query<HubsParams>,
) -> Result<Response, ApiError> {
    let hubs = engine
        .associations
        .hubs(
            params.limit.unwrap_or(DEFAULT_HUB_LIMIT),
            params.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS),
        )
        .await?;
    Ok(success(StatusCode::OK, HubsPayload { hubs }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatsParams {
    pub memory_id: Uuid,
}

#[derive(Serialize)]
pub struct NetworkStatsPayload {
    pub network_stats: NetworkStats,
}

pub async fn network_stats(
    State(engine): State<AppState>,
    Query(params): Query<NetworkStatsParams>,
) -> Result<Response, ApiError> {
    let network_stats = engine.associations.network_stats(params.memory_id).await?;
    Ok(success(StatusCode::OK, NetworkStatsPayload { network_stats }))
}
