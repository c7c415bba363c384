//! Reciprocal Rank Fusion algorithm for combining lexical and vector rankings

use super::{rank_descending, ScoredResult};
use crate::error::{Result, TributaryError};
use std::collections::HashMap;

/// Configuration for fusion algorithm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Vector weight; the lexical list gets `1 - alpha`
    pub alpha: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            alpha: 0.5,
        }
    }
}

impl FusionConfig {
    pub fn new(rrf_k: f32, alpha: f32) -> Result<Self> {
        if !(rrf_k > 0.0) {
            return Err(TributaryError::InvalidConfigValue {
                path: "retrieval.rrf_k".to_string(),
                message: format!("rrf_k must be > 0, got {}", rrf_k),
            });
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(TributaryError::InvalidConfigValue {
                path: "alpha".to_string(),
                message: format!("alpha must be in [0.0, 1.0], got {}", alpha),
            });
        }

        Ok(Self { rrf_k, alpha })
    }

    /// Highest attainable fused score: rank 1 in both lists
    pub fn max_score(&self) -> f32 {
        1.0 / (self.rrf_k + 1.0)
    }
}

/// Apply Reciprocal Rank Fusion to combine two ranked lists
///
/// RRF formula: `fused(d) = alpha / (k + rank_vector(d)) + (1 - alpha) / (k + rank_lexical(d))`,
/// where a document missing from a list contributes nothing for that list.
///
/// Documents whose fused score is zero (present only in a list weighted 0)
/// are dropped, so `alpha = 0` reproduces the lexical order exactly and
/// `alpha = 1` the vector order.
///
/// # Returns
/// Fused ranking with `raw_score` set to the fused score, ranks renumbered from 1
pub fn reciprocal_rank_fusion(
    lexical: &[ScoredResult],
    vector: &[ScoredResult],
    config: &FusionConfig,
) -> Vec<ScoredResult> {
    let mut scores: HashMap<&str, f32> = HashMap::new();

    let lexical_weight = 1.0 - config.alpha;
    for result in lexical {
        let rrf_score = lexical_weight / (config.rrf_k + result.rank as f32);
        *scores.entry(result.document_id.as_str()).or_insert(0.0) += rrf_score;
    }

    for result in vector {
        let rrf_score = config.alpha / (config.rrf_k + result.rank as f32);
        *scores.entry(result.document_id.as_str()).or_insert(0.0) += rrf_score;
    }

    rank_descending(
        scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(id, score)| (id.to_string(), score))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::rank_descending;

    fn ranking(ids: &[&str]) -> Vec<ScoredResult> {
        let n = ids.len() as f32;
        rank_descending(
            ids.iter()
                .enumerate()
                .map(|(i, id)| (id.to_string(), n - i as f32))
                .collect(),
        )
    }

    fn ids(results: &[ScoredResult]) -> Vec<&str> {
        results.iter().map(|r| r.document_id.as_str()).collect()
    }

    #[test]
    fn test_rrf_basic() {
        let lexical = ranking(&["a", "b", "c"]);
        let vector = ranking(&["b", "a", "d"]);

        let fused = reciprocal_rank_fusion(&lexical, &vector, &FusionConfig::default());

        assert_eq!(fused.len(), 4);
        // a and b appear in both lists, should rank higher
        assert_eq!(ids(&fused)[..2], ["a", "b"]);
        assert_eq!(fused[0].rank, 1);
    }

    #[test]
    fn test_alpha_zero_is_pure_lexical() {
        let lexical = ranking(&["c", "a", "b"]);
        let vector = ranking(&["a", "b", "x"]);
        let config = FusionConfig::new(60.0, 0.0).unwrap();

        let fused = reciprocal_rank_fusion(&lexical, &vector, &config);
        assert_eq!(ids(&fused), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_alpha_one_is_pure_vector() {
        let lexical = ranking(&["c", "a", "b"]);
        let vector = ranking(&["b", "x", "a"]);
        let config = FusionConfig::new(60.0, 1.0).unwrap();

        let fused = reciprocal_rank_fusion(&lexical, &vector, &config);
        assert_eq!(ids(&fused), vec!["b", "x", "a"]);
    }

    #[test]
    fn test_identical_rankings_are_preserved_at_balance() {
        let order = ["d", "a", "c", "b", "e"];
        let fused = reciprocal_rank_fusion(
            &ranking(&order),
            &ranking(&order),
            &FusionConfig::default(),
        );
        assert_eq!(ids(&fused), order.to_vec());
    }

    #[test]
    fn test_single_list_degrades_gracefully() {
        let lexical = ranking(&["a", "b"]);
        let fused = reciprocal_rank_fusion(&lexical, &[], &FusionConfig::default());
        assert_eq!(ids(&fused), vec!["a", "b"]);
    }

    #[test]
    fn test_max_score() {
        let config = FusionConfig::default();
        let fused = reciprocal_rank_fusion(&ranking(&["a"]), &ranking(&["a"]), &config);
        assert!((fused[0].raw_score - config.max_score()).abs() < 1e-7);
    }

    #[test]
    fn test_invalid_config() {
        assert!(FusionConfig::new(0.0, 0.5).is_err());
        assert!(FusionConfig::new(60.0, 1.5).is_err());
        assert!(FusionConfig::new(60.0, -0.1).is_err());
    }
}
