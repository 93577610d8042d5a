//! φ-weighted centroid math.

use uuid::Uuid;

use anima_core::errors::{AnimaError, AnimaResult};
use anima_core::models::CentroidResult;
use anima_embeddings::vector::cosine_similarity;

/// A cluster member's id, embedding, and φ.
pub struct WeightedMember {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub resonance_phi: f64,
}

/// Compute the φ-weighted centroid of a cluster and identify the core
/// memory — the member closest to the centroid.
///
/// Each member weighs `φ + 1.0` so zero-φ members still contribute.
pub fn weighted_centroid(members: &[WeightedMember]) -> AnimaResult<CentroidResult> {
    let Some(first) = members.first() else {
        return Err(AnimaError::EmptyCluster);
    };

    let dims = first.embedding.len();
    let mut centroid = vec![0.0f64; dims];
    let mut total_weight = 0.0f64;

    for member in members {
        let weight = member.resonance_phi + 1.0;
        total_weight += weight;
        for (acc, x) in centroid.iter_mut().zip(member.embedding.iter()) {
            *acc += weight * (*x as f64);
        }
    }

    let centroid: Vec<f32> = centroid
        .into_iter()
        .map(|x| (x / total_weight) as f32)
        .collect();

    let core = members
        .iter()
        .map(|m| (m.id, cosine_similarity(&m.embedding, &centroid)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(id, _)| id)
        .ok_or(AnimaError::EmptyCluster)?;

    Ok(CentroidResult {
        centroid,
        core_memory_id: core,
        member_count: members.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(phi: f64, embedding: Vec<f32>) -> WeightedMember {
        WeightedMember {
            id: Uuid::new_v4(),
            embedding,
            resonance_phi: phi,
        }
    }

    #[test]
    fn empty_cluster_is_an_error() {
        let err = weighted_centroid(&[]).unwrap_err();
        assert_eq!(err.code(), "CONSOLIDATION_ERROR");
    }

    #[test]
    fn single_member_is_its_own_core() {
        let m = member(2.0, vec![1.0, 0.0]);
        let id = m.id;
        let result = weighted_centroid(&[m]).unwrap();
        assert_eq!(result.core_memory_id, id);
        assert_eq!(result.member_count, 1);
        assert!((result.centroid[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn high_phi_member_pulls_the_centroid() {
        let heavy = member(4.0, vec![1.0, 0.0]);
        let heavy_id = heavy.id;
        let light = member(0.0, vec![0.0, 1.0]);
        let result = weighted_centroid(&[heavy, light]).unwrap();
        // Weight 5.0 vs 1.0: the centroid leans toward the heavy member.
        assert!(result.centroid[0] > result.centroid[1]);
        assert_eq!(result.core_memory_id, heavy_id);
    }

    #[test]
    fn equal_weights_average_evenly() {
        let a = member(1.0, vec![1.0, 0.0]);
        let b = member(1.0, vec![0.0, 1.0]);
        let result = weighted_centroid(&[a, b]).unwrap();
        assert!((result.centroid[0] - result.centroid[1]).abs() < 1e-6);
    }
}
