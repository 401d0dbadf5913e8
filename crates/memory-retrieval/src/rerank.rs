//! Weighted diminishing-returns reranking.
//!
//! Each appearance of a record is weighted by its node and index. Repeated
//! appearances of the same record boost it with shrinking multipliers, and the
//! sum is capped at 1.0.

use std::collections::HashMap;

use memory_types::{RerankingConfig, SearchIndexResult, SearchResult};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct Reranker {
    config: RerankingConfig,
}

struct Appearance {
    weighted: f32,
    result: SearchIndexResult,
}

impl Reranker {
    pub fn new(config: RerankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RerankingConfig {
        &self.config
    }

    /// Merge per-index results into one row per record, best first.
    ///
    /// Ties are broken by creation time, newest first.
    pub fn rerank(&self, results: Vec<SearchIndexResult>) -> Vec<SearchResult> {
        let input = results.len();
        let mut groups: Vec<Vec<Appearance>> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for result in results {
            let weighted = result.base_relevance
                * self.config.index_weight(&result.node_id, &result.index_id)
                * self.config.node_weight(&result.node_id);
            let appearance = Appearance { weighted, result };

            match positions.get(&appearance.result.record_id) {
                Some(&pos) => groups[pos].push(appearance),
                None => {
                    positions.insert(appearance.result.record_id.clone(), groups.len());
                    groups.push(vec![appearance]);
                }
            }
        }

        let mut reranked: Vec<SearchResult> = groups
            .into_iter()
            .filter_map(|group| self.aggregate(group))
            .collect();

        reranked.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        debug!(input, output = reranked.len(), "Reranked results");
        reranked
    }

    fn aggregate(&self, mut group: Vec<Appearance>) -> Option<SearchResult> {
        group.sort_by(|a, b| b.weighted.total_cmp(&a.weighted));

        let score: f32 = group
            .iter()
            .enumerate()
            .map(|(i, appearance)| appearance.weighted * self.config.multiplier(i))
            .sum();

        let best = group.into_iter().next()?.result;
        Some(SearchResult {
            id: best.record_id,
            node_id: best.node_id,
            relevance: score.min(1.0),
            title: best.title,
            description: best.description,
            content: best.content,
            mime_type: best.mime_type,
            created_at: best.created_at,
            tags: best.tags,
            metadata: best.metadata,
        })
    }
}
