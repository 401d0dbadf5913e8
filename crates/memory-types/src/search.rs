//! Caller-facing request and response shapes.
//!
//! These are the stable contract consumed by any transport (CLI, HTTP, RPC).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::ContentRecord;
use crate::error::SearchError;
use crate::qualified_id::QualifiedId;

/// Default page size when a request does not specify one.
pub const DEFAULT_LIMIT: usize = 20;

/// Default minimum relevance for returned results.
pub const DEFAULT_MIN_RELEVANCE: f32 = 0.3;

/// Default positional multipliers for repeated appearances of one record.
pub const DEFAULT_DIMINISHING_MULTIPLIERS: [f32; 4] = [1.0, 0.5, 0.25, 0.125];

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_min_relevance() -> f32 {
    DEFAULT_MIN_RELEVANCE
}

/// A search over one or more nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text, handed to the query parser
    pub query: String,

    /// Nodes to search (empty = all configured nodes)
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Nodes to leave out
    #[serde(default)]
    pub exclude_nodes: Vec<String>,

    /// Search indexes to use (empty = all indexes of each node)
    #[serde(default)]
    pub search_indexes: Vec<String>,

    /// Search indexes to leave out
    #[serde(default)]
    pub exclude_indexes: Vec<String>,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,

    /// Results below this relevance are dropped (0.0-1.0)
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,

    #[serde(default)]
    pub max_results_per_node: Option<usize>,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Per-request node importance, overriding configured weights
    #[serde(default)]
    pub node_weights: Option<HashMap<String, f32>>,

    /// Replace result content with the engine snippet
    #[serde(default)]
    pub snippet_only: bool,

    /// Wrap matched terms in snippets with highlight markers
    #[serde(default)]
    pub highlight: bool,

    /// Maximum snippet length in characters
    #[serde(default)]
    pub snippet_length: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            nodes: Vec::new(),
            exclude_nodes: Vec::new(),
            search_indexes: Vec::new(),
            exclude_indexes: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
            min_relevance: DEFAULT_MIN_RELEVANCE,
            max_results_per_node: None,
            timeout_seconds: None,
            node_weights: None,
            snippet_only: false,
            highlight: false,
            snippet_length: None,
        }
    }

    pub fn with_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn excluding_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_indexes<I, S>(mut self, indexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_indexes = indexes.into_iter().map(Into::into).collect();
        self
    }

    pub fn excluding_indexes<I, S>(mut self, indexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_indexes = indexes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_max_results_per_node(mut self, max: usize) -> Self {
        self.max_results_per_node = Some(max);
        self
    }

    pub fn with_node_weight(mut self, node_id: impl Into<String>, weight: f32) -> Self {
        self.node_weights
            .get_or_insert_with(HashMap::new)
            .insert(node_id.into(), weight);
        self
    }

    /// Check the request shape before any work is done.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.query.trim().is_empty() {
            return Err(SearchError::InvalidRequest("query is empty".to_string()));
        }
        if self.limit == 0 {
            return Err(SearchError::InvalidRequest(
                "limit must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_relevance) {
            return Err(SearchError::InvalidRequest(format!(
                "min_relevance must be 0.0-1.0, got {}",
                self.min_relevance
            )));
        }
        if self.timeout_seconds == Some(0) {
            return Err(SearchError::InvalidRequest(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.max_results_per_node == Some(0) {
            return Err(SearchError::InvalidRequest(
                "max_results_per_node must be greater than 0".to_string(),
            ));
        }
        if let Some(weights) = &self.node_weights {
            if let Some((node, weight)) = weights.iter().find(|(_, w)| w.is_nan() || **w < 0.0) {
                return Err(SearchError::InvalidRequest(format!(
                    "node weight for '{}' must be >= 0, got {}",
                    node, weight
                )));
            }
        }
        Ok(())
    }
}

/// One index's opinion about one record, before reranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexResult {
    pub record_id: String,
    pub node_id: String,
    pub index_id: String,

    /// Chunk within the record, for indexes that split content
    #[serde(default)]
    pub chunk_id: Option<String>,

    /// Engine-reported relevance (0.0-1.0), before weighting
    pub base_relevance: f32,

    pub title: Option<String>,
    pub description: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub mime_type: String,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl SearchIndexResult {
    /// Wrap a hydrated record.
    pub fn from_record(
        record: ContentRecord,
        node_id: impl Into<String>,
        index_id: impl Into<String>,
        base_relevance: f32,
    ) -> Self {
        Self {
            record_id: record.id,
            node_id: node_id.into(),
            index_id: index_id.into(),
            chunk_id: None,
            base_relevance,
            title: record.title,
            description: record.description,
            content: record.content,
            created_at: record.created_at,
            mime_type: record.mime_type,
            tags: record.tags,
            metadata: record.metadata,
        }
    }
}

/// One row of the final response, one per distinct record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,

    /// Node of the best-scoring appearance
    pub node_id: String,

    /// Final relevance after weighting and aggregation (0.0-1.0)
    pub relevance: f32,

    pub title: Option<String>,
    pub description: Option<String>,
    pub content: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl SearchResult {
    /// The `node:record` id addressing this result.
    pub fn qualified_id(&self) -> QualifiedId {
        QualifiedId::new(self.node_id.clone(), self.id.clone())
    }
}

/// Execution details reported alongside results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Nodes that completed a search
    pub nodes_searched: usize,

    /// Nodes the search was dispatched to: the requested (or all) nodes
    /// minus exclusions and write-only nodes skipped implicitly
    pub nodes_requested: usize,

    /// Total wall-clock time
    pub execution_time_ms: u64,

    /// Per-node search time
    pub node_timings_ms: BTreeMap<String, u64>,

    /// Non-fatal problems (skipped indexes, skipped nodes)
    pub warnings: Vec<String>,
}

/// The answer to a [`SearchRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,

    /// Results passing the relevance filter, before pagination
    pub total_results: usize,

    pub results: Vec<SearchResult>,

    pub metadata: SearchMetadata,
}

/// Outcome of a validate-only query check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryValidation {
    pub valid: bool,

    #[serde(default)]
    pub message: Option<String>,

    /// Character offset of a syntax error
    #[serde(default)]
    pub position: Option<usize>,
}

impl QueryValidation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: None,
            position: None,
        }
    }

    pub fn invalid(err: &SearchError) -> Self {
        let position = match err {
            SearchError::QuerySyntax { position, .. } => Some(*position),
            _ => None,
        };
        Self {
            valid: false,
            message: Some(err.to_string()),
            position,
        }
    }
}

/// Weights used by the reranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankingConfig {
    /// Node id -> weight (missing = default)
    #[serde(default)]
    pub node_weights: HashMap<String, f32>,

    /// Node id -> index id -> weight (missing = default)
    #[serde(default)]
    pub index_weights: HashMap<String, HashMap<String, f32>>,

    /// Positional multipliers for repeated appearances; never empty
    pub diminishing_multipliers: Vec<f32>,

    #[serde(default = "default_weight")]
    pub default_node_weight: f32,

    #[serde(default = "default_weight")]
    pub default_index_weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl Default for RerankingConfig {
    fn default() -> Self {
        Self {
            node_weights: HashMap::new(),
            index_weights: HashMap::new(),
            diminishing_multipliers: DEFAULT_DIMINISHING_MULTIPLIERS.to_vec(),
            default_node_weight: default_weight(),
            default_index_weight: default_weight(),
        }
    }
}

impl RerankingConfig {
    pub fn node_weight(&self, node_id: &str) -> f32 {
        self.node_weights
            .get(node_id)
            .copied()
            .unwrap_or(self.default_node_weight)
    }

    pub fn index_weight(&self, node_id: &str, index_id: &str) -> f32 {
        self.index_weights
            .get(node_id)
            .and_then(|indexes| indexes.get(index_id))
            .copied()
            .unwrap_or(self.default_index_weight)
    }

    /// Multiplier for the `position`-th appearance (0-based) of a record.
    ///
    /// Past the configured list, the last multiplier keeps halving.
    pub fn multiplier(&self, position: usize) -> f32 {
        let multipliers = &self.diminishing_multipliers;
        let Some(last) = multipliers.last() else {
            return 0.0;
        };
        if position < multipliers.len() {
            multipliers[position]
        } else {
            let extra = (position - multipliers.len() + 1) as i32;
            last * 0.5_f32.powi(extra)
        }
    }
}
