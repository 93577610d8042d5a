//! Options and results for the add and query operations.

use serde::{Deserialize, Serialize};

use super::memory::{Memory, Tier};
use super::promotion::Promotion;
use crate::constants::{DEFAULT_QUERY_LIMIT, DEFAULT_SIMILARITY_THRESHOLD, MAX_QUERY_LIMIT};

/// Result of `add`: the (possibly pre-existing or merged) memory plus
/// how it was resolved.
#[derive(Debug, Clone, Serialize)]
pub struct AddResult {
    pub memory: Memory,
    pub is_duplicate: bool,
    pub exact_match: bool,
    pub is_merged: bool,
    /// Tag of the provider that produced the embedding.
    pub embedding_provider: String,
}

/// Options for a semantic query.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryOptions {
    pub limit: i64,
    pub threshold: f64,
    /// Restrict results to these tiers. Empty means all tiers.
    pub tiers: Vec<Tier>,
    pub conversation_id: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_QUERY_LIMIT,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            tiers: Vec::new(),
            conversation_id: None,
        }
    }
}

impl QueryOptions {
    /// Clamp the threshold at zero and cap the limit. A non-positive limit
    /// is preserved so the service can short-circuit without I/O.
    pub fn normalised(mut self) -> Self {
        if self.threshold < 0.0 {
            self.threshold = 0.0;
        }
        if self.limit > MAX_QUERY_LIMIT {
            self.limit = MAX_QUERY_LIMIT;
        }
        self
    }
}

/// A query hit: the memory and its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    #[serde(flatten)]
    pub memory: Memory,
    pub similarity: f64,
}

/// Result of `query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub memories: Vec<ScoredMemory>,
    pub promotions: Vec<Promotion>,
    pub query_time_ms: u64,
    pub embedding_provider: String,
}
