//! Session reflections: friction and retrieval metrics plus derived insights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{FRICTION_SMOOTH_MAX, FRICTION_STICKY_MAX};
use crate::errors::{AnimaError, AnimaResult};

/// What prompted a reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionType {
    ConversationEnd,
    Weekly,
    Bootstrap,
    Manual,
}

impl ReflectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationEnd => "conversation_end",
            Self::Weekly => "weekly",
            Self::Bootstrap => "bootstrap",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> AnimaResult<Self> {
        match s {
            "conversation_end" => Ok(Self::ConversationEnd),
            "weekly" => Ok(Self::Weekly),
            "bootstrap" => Ok(Self::Bootstrap),
            "manual" => Ok(Self::Manual),
            other => Err(AnimaError::validation(format!(
                "unknown reflection type: {other}"
            ))),
        }
    }
}

/// Raw per-session counters reported by the client at conversation end.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionMetrics {
    pub load_time_ms: u64,
    pub memories_loaded: u64,
    pub memories_accessed: u64,
    pub queries: u64,
    pub results_returned: u64,
    pub queries_with_hits: u64,
    /// Sum of per-query top-result similarities, for the relevance average.
    pub relevance_sum: f64,
}

/// Qualitative friction bucket derived from the waste ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrictionFeel {
    Smooth,
    Sticky,
    Rough,
}

impl FrictionFeel {
    pub fn for_waste_ratio(waste: f64) -> Self {
        if waste <= FRICTION_SMOOTH_MAX {
            Self::Smooth
        } else if waste <= FRICTION_STICKY_MAX {
            Self::Sticky
        } else {
            Self::Rough
        }
    }
}

/// How much loaded context went unused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrictionMetrics {
    pub load_time_ms: u64,
    pub memories_loaded: u64,
    pub memories_accessed: u64,
    /// `1 − accessed/loaded`, 0 when nothing was loaded.
    pub waste_ratio: f64,
    pub feel: FrictionFeel,
}

/// How retrieval performed over the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub queries: u64,
    pub avg_results: f64,
    /// Fraction of queries that returned at least one memory.
    pub hit_rate: f64,
    pub avg_relevance: f64,
}

/// A highly connected memory, summarised for the reflection hub block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSummary {
    pub memory_id: Uuid,
    pub connections: i64,
    pub total_strength: f64,
}

/// The full structured metrics block persisted with a reflection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionMetrics {
    pub friction: FrictionMetrics,
    pub retrieval: RetrievalMetrics,
    pub hubs: Vec<HubSummary>,
}

/// A persisted reflection row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    pub id: Uuid,
    pub reflection_type: ReflectionType,
    pub conversation_id: Option<String>,
    pub metrics: ReflectionMetrics,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feel_buckets() {
        assert_eq!(FrictionFeel::for_waste_ratio(0.0), FrictionFeel::Smooth);
        assert_eq!(FrictionFeel::for_waste_ratio(0.2), FrictionFeel::Smooth);
        assert_eq!(FrictionFeel::for_waste_ratio(0.35), FrictionFeel::Sticky);
        assert_eq!(FrictionFeel::for_waste_ratio(0.5), FrictionFeel::Sticky);
        assert_eq!(FrictionFeel::for_waste_ratio(0.9), FrictionFeel::Rough);
    }
}
