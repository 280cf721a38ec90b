//! Reciprocal Rank Fusion (RRF) for combining keyword and vector rankings

use crate::models::SearchHit;
use std::collections::HashMap;

/// RRF fusion parameters
#[derive(Debug, Clone)]
pub struct RRFusion {
    /// Constant k (typically 60)
    pub k: f32,

    pub vector_weight: f32,

    pub keyword_weight: f32,
}

impl Default for RRFusion {
    fn default() -> Self {
        Self {
            k: 60.0,
            vector_weight: 0.5,
            keyword_weight: 0.5,
        }
    }
}

impl RRFusion {
    /// Fuse two ranked lists by hit id. Scores are normalised so the best hit is 1.0.
    pub fn fuse(&self, keyword: Vec<SearchHit>, vector: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
        let mut fused: HashMap<String, (SearchHit, f32)> = HashMap::new();

        for (rank, hit) in keyword.into_iter().enumerate() {
            let score = self.keyword_weight / (self.k + (rank + 1) as f32);
            fused.insert(hit.id.clone(), (hit, score));
        }

        for (rank, hit) in vector.into_iter().enumerate() {
            let score = self.vector_weight / (self.k + (rank + 1) as f32);
            fused
                .entry(hit.id.clone())
                .and_modify(|(_, s)| *s += score)
                .or_insert((hit, score));
        }

        let mut results: Vec<SearchHit> = fused
            .into_values()
            .map(|(mut hit, score)| {
                hit.score = score;
                hit
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(limit);

        if let Some(max_score) = results.first().map(|h| h.score) {
            if max_score > 0.0 {
                for hit in &mut results {
                    hit.score /= max_score;
                }
            }
        }

        results
    }
}
