//! Results of the semantic consolidation operations.

use serde::Serialize;
use uuid::Uuid;

use super::memory::Memory;

/// The best live semantic duplicate for an embedding, if any.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticDuplicate {
    pub id: Uuid,
    pub similarity: f64,
}

/// Result of merging a fragment into its attractor.
#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    /// The surviving centroid memory, post-merge.
    pub memory: Memory,
    pub similarity: f64,
    /// φ added to the centroid by this merge (after scaling and clamping).
    pub phi_contributed: f64,
}

/// One member of a semantic cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterMember {
    #[serde(flatten)]
    pub memory: Memory,
    pub similarity: f64,
}

/// Classification of a fragmented pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FragmentClass {
    HighConfidenceMerge,
    PotentialMerge,
    Related,
}

impl FragmentClass {
    /// Classify by pairwise similarity.
    pub fn for_similarity(similarity: f64) -> Self {
        if similarity >= crate::constants::SEMANTIC_DUPLICATE_THRESHOLD {
            Self::HighConfidenceMerge
        } else if similarity >= crate::constants::FRAGMENTATION_THRESHOLD {
            Self::PotentialMerge
        } else {
            Self::Related
        }
    }
}

/// A pair of near-duplicate live memories surfaced by the fragmentation scan.
#[derive(Debug, Clone, Serialize)]
pub struct FragmentationCandidate {
    pub memory_a: Uuid,
    pub memory_b: Uuid,
    pub similarity: f64,
    pub total_phi: f64,
    pub class: FragmentClass,
}

/// φ-weighted centroid of a cluster.
#[derive(Debug, Clone, Serialize)]
pub struct CentroidResult {
    pub centroid: Vec<f32>,
    /// The member closest to the centroid.
    pub core_memory_id: Uuid,
    pub member_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_thresholds() {
        assert_eq!(
            FragmentClass::for_similarity(0.97),
            FragmentClass::HighConfidenceMerge
        );
        assert_eq!(
            FragmentClass::for_similarity(0.95),
            FragmentClass::HighConfidenceMerge
        );
        assert_eq!(
            FragmentClass::for_similarity(0.93),
            FragmentClass::PotentialMerge
        );
        assert_eq!(FragmentClass::for_similarity(0.92), FragmentClass::PotentialMerge);
        assert_eq!(FragmentClass::for_similarity(0.5), FragmentClass::Related);
    }
}
