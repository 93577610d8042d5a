//! The memory row, the universal unit of storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::PHI_MAX;
use crate::errors::{AnimaError, AnimaResult};

/// Lifecycle tier of a memory.
///
/// `network` is accepted as a manual destination but never produced by
/// automatic promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Active,
    Thread,
    Stable,
    Network,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Thread => "thread",
            Self::Stable => "stable",
            Self::Network => "network",
        }
    }

    pub fn parse(s: &str) -> AnimaResult<Self> {
        match s {
            "active" => Ok(Self::Active),
            "thread" => Ok(Self::Thread),
            "stable" => Ok(Self::Stable),
            "network" => Ok(Self::Network),
            other => Err(AnimaError::validation(format!("unknown tier: {other}"))),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored memory: content, embedding, tier, and resonance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v4 identifier.
    pub id: Uuid,
    /// Free text content.
    pub content: String,
    /// blake3 hex fingerprint of the content, unique among live rows.
    pub content_fingerprint: String,
    /// Unit vector of the deployment's fixed dimension.
    pub embedding: Vec<f32>,
    /// Current lifecycle tier.
    pub tier: Tier,
    /// When the tier last changed.
    pub tier_updated_at: DateTime<Utc>,
    /// Gravitational weight, clamped to [0, 5].
    pub resonance_phi: f64,
    /// Whether this memory is flagged as a breakthrough.
    pub is_catalyst: bool,
    /// Times this memory has been returned by queries.
    pub access_count: i64,
    pub last_accessed_at: DateTime<Utc>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    /// Conversation this memory originated in, if any.
    pub conversation_id: Option<String>,
    /// Append-only structured container (`semantic_variants`,
    /// `visited_conversations` live here).
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. A deleted row is invisible to every query
    /// except admin paths.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Memory {
    /// Deterministic content fingerprint. The same hash family keys the
    /// embedding cache.
    pub fn fingerprint(content: &str) -> String {
        blake3::hash(content.as_bytes()).to_hex().to_string()
    }

    /// Number of semantic variants merged into this memory.
    pub fn variant_count(&self) -> usize {
        self.metadata
            .get("semantic_variants")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Clamp a φ value into the legal [0, PHI_MAX] range.
pub fn clamp_phi(phi: f64) -> f64 {
    phi.clamp(0.0, PHI_MAX)
}

impl PartialEq for Memory {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = Memory::fingerprint("the same text");
        let b = Memory::fingerprint("the same text");
        assert_eq!(a, b);
        assert_ne!(a, Memory::fingerprint("different text"));
    }

    #[test]
    fn tier_round_trips() {
        for t in [Tier::Active, Tier::Thread, Tier::Stable, Tier::Network] {
            assert_eq!(Tier::parse(t.as_str()).unwrap(), t);
        }
        assert!(Tier::parse("archived").is_err());
    }

    proptest! {
        #[test]
        fn phi_always_in_range(phi in -100.0f64..100.0) {
            let clamped = clamp_phi(phi);
            prop_assert!((0.0..=PHI_MAX).contains(&clamped));
        }
    }
}
