//! Association-graph views: edges, hubs, and per-memory network stats.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One association as seen from a focal memory.
#[derive(Debug, Clone, Serialize)]
pub struct AssociationView {
    /// The other end of the edge.
    pub memory_id: Uuid,
    /// Content preview of the partner memory.
    pub content: String,
    pub strength: f64,
    pub co_occurrence_count: i64,
    pub last_co_occurred_at: DateTime<Utc>,
}

/// A highly connected memory.
#[derive(Debug, Clone, Serialize)]
pub struct HubView {
    pub memory_id: Uuid,
    pub content: String,
    pub resonance_phi: f64,
    pub connections: i64,
    pub total_strength: f64,
}

/// Network statistics around a single memory.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkStats {
    pub memory_id: Uuid,
    /// Number of association edges touching this memory.
    pub degree: i64,
    pub total_strength: f64,
    pub avg_strength: f64,
    pub strongest_partner: Option<Uuid>,
    pub strongest_strength: f64,
    pub first_association_at: Option<DateTime<Utc>>,
    pub last_association_at: Option<DateTime<Utc>>,
}
