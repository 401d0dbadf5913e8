//! Per-node search execution.
//!
//! A node is one independently indexed partition: a set of FTS indexes plus
//! the content store their ids point into. A search translates the query,
//! runs it against every selected index, hydrates each hit, drops records
//! matching negated terms or failing structured conditions, and tags the
//! survivors with the node and index that produced them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use memory_query::{compile_structured, ExcludedTermFilter, FtsQueryTranslator, QueryNode};
use memory_search::{FtsIndex, FtsIndexConfig, FtsMatch, SnippetOptions};
use memory_types::{
    ContentRecord, NodeAccess, NodeSettings, SearchError, SearchIndexResult, SearchIndexSettings,
    SearchRequest, SearchSettings,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::content::ContentStore;

/// Index id used when a node is given an engine without an explicit id.
pub const DEFAULT_INDEX_ID: &str = "default";

/// Static description of one index on a node.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    pub id: String,
    /// Cannot be excluded; a failure fails the whole node
    pub required: bool,
    pub weight: Option<f32>,
}

impl IndexDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            required: false,
            weight: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Whether the request asks for this index to be searched.
    pub fn is_selected(&self, request: &SearchRequest) -> bool {
        if self.required {
            return true;
        }
        let listed =
            request.search_indexes.is_empty() || request.search_indexes.contains(&self.id);
        listed && !request.exclude_indexes.contains(&self.id)
    }
}

/// What one node returned.
#[derive(Debug, Clone, Default)]
pub struct NodeSearchOutcome {
    pub node_id: String,
    pub results: Vec<SearchIndexResult>,
    /// Non-fatal index failures
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

/// A searchable node.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    fn id(&self) -> &str;

    fn access(&self) -> NodeAccess {
        NodeAccess::Full
    }

    /// Configured weight, if any
    fn weight(&self) -> Option<f32> {
        None
    }

    fn indexes(&self) -> Vec<IndexDescriptor>;

    /// Run the search without deadline handling; see [`search_node`].
    async fn execute(
        &self,
        ast: &QueryNode,
        request: &SearchRequest,
    ) -> Result<NodeSearchOutcome, SearchError>;
}

/// Run a node search under its deadline and the caller's cancellation token.
///
/// The deadline is `request.timeout_seconds`, or `default_timeout` when the
/// request leaves it unset.
pub async fn search_node<N>(
    node: &N,
    ast: &QueryNode,
    request: &SearchRequest,
    default_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<NodeSearchOutcome, SearchError>
where
    N: NodeExecutor + ?Sized,
{
    let start = Instant::now();
    let deadline = request
        .timeout_seconds
        .map(Duration::from_secs)
        .unwrap_or(default_timeout);

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(node_id = %node.id(), "Node search cancelled");
            return Err(SearchError::node_unavailable(node.id(), "search cancelled"));
        }
        result = tokio::time::timeout(deadline, node.execute(ast, request)) => result,
    };

    let elapsed = start.elapsed();
    match outcome {
        Ok(Ok(mut outcome)) => {
            outcome.elapsed = elapsed;
            info!(
                node_id = %node.id(),
                results = outcome.results.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Node search completed"
            );
            Ok(outcome)
        }
        Ok(Err(e)) => {
            warn!(node_id = %node.id(), error = %e, "Node search failed");
            Err(e.for_node(node.id()))
        }
        Err(_) => {
            warn!(node_id = %node.id(), elapsed_ms = elapsed.as_millis() as u64, "Node search timed out");
            Err(SearchError::NodeTimeout {
                node_id: node.id().to_string(),
                elapsed,
            })
        }
    }
}

/// An FTS engine attached to a node.
#[derive(Clone)]
pub struct NodeIndex {
    pub descriptor: IndexDescriptor,
    pub engine: Arc<FtsIndex>,
}

impl NodeIndex {
    pub fn new(descriptor: IndexDescriptor, engine: Arc<FtsIndex>) -> Self {
        Self { descriptor, engine }
    }

    pub fn from_settings(settings: &SearchIndexSettings) -> Self {
        Self {
            descriptor: IndexDescriptor {
                id: settings.id.clone(),
                required: settings.required,
                weight: settings.weight,
            },
            engine: Arc::new(FtsIndex::new(FtsIndexConfig::from_settings(settings))),
        }
    }
}

/// Node backed by SQLite FTS indexes and a content store.
pub struct NodeSearcher {
    id: String,
    access: NodeAccess,
    weight: Option<f32>,
    indexes: Vec<NodeIndex>,
    store: Arc<dyn ContentStore>,
    settings: Arc<SearchSettings>,
    translator: FtsQueryTranslator,
}

impl NodeSearcher {
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn ContentStore>,
        settings: Arc<SearchSettings>,
    ) -> Self {
        Self {
            id: id.into(),
            access: NodeAccess::default(),
            weight: None,
            indexes: Vec::new(),
            store,
            settings,
            translator: FtsQueryTranslator::new(),
        }
    }

    /// Build a node and its index handles from configuration. Indexes open
    /// lazily on first search.
    pub fn from_settings(
        node: &NodeSettings,
        store: Arc<dyn ContentStore>,
        settings: Arc<SearchSettings>,
    ) -> Self {
        let mut searcher = Self::new(&node.id, store, settings).with_access(node.access);
        searcher.weight = node.weight;
        searcher.indexes = node
            .search_indexes
            .iter()
            .map(NodeIndex::from_settings)
            .collect();
        searcher
    }

    pub fn with_access(mut self, access: NodeAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_index(mut self, index: NodeIndex) -> Self {
        self.indexes.push(index);
        self
    }

    /// Attach an engine under [`DEFAULT_INDEX_ID`].
    pub fn with_engine(self, engine: Arc<FtsIndex>) -> Self {
        self.with_index(NodeIndex::new(IndexDescriptor::new(DEFAULT_INDEX_ID), engine))
    }

    pub fn index_handles(&self) -> &[NodeIndex] {
        &self.indexes
    }

    /// Search with this node's default deadline and no outside cancellation.
    pub async fn search(
        &self,
        ast: &QueryNode,
        request: &SearchRequest,
    ) -> Result<NodeSearchOutcome, SearchError> {
        let default_timeout = Duration::from_secs(self.settings.default_timeout_secs);
        search_node(self, ast, request, default_timeout, &CancellationToken::new()).await
    }

    fn snippet_options(&self, request: &SearchRequest) -> SnippetOptions {
        if request.highlight {
            SnippetOptions::highlighted(
                &self.settings.highlight_prefix,
                &self.settings.highlight_suffix,
            )
        } else {
            SnippetOptions::default()
        }
    }

    async fn query_index(
        &self,
        index: &NodeIndex,
        fts_query: &str,
        limit: usize,
        snippet: &SnippetOptions,
    ) -> Result<Vec<FtsMatch>, String> {
        let engine = Arc::clone(&index.engine);
        let query = fts_query.to_string();
        let snippet = snippet.clone();

        tokio::task::spawn_blocking(move || engine.search_with(&query, limit, &snippet))
            .await
            .map_err(|e| format!("search task failed: {e}"))?
            .map_err(|e| e.to_string())
    }

    async fn hydrate(
        &self,
        cache: &mut HashMap<String, Option<ContentRecord>>,
        id: &str,
    ) -> Result<Option<ContentRecord>, SearchError> {
        if let Some(cached) = cache.get(id) {
            return Ok(cached.clone());
        }
        let record = self
            .store
            .get_by_id(id)
            .await
            .map_err(|e| SearchError::node_unavailable(&self.id, e))?;
        cache.insert(id.to_string(), record.clone());
        Ok(record)
    }
}

#[async_trait]
impl NodeExecutor for NodeSearcher {
    fn id(&self) -> &str {
        &self.id
    }

    fn access(&self) -> NodeAccess {
        self.access
    }

    fn weight(&self) -> Option<f32> {
        self.weight
    }

    fn indexes(&self) -> Vec<IndexDescriptor> {
        self.indexes.iter().map(|i| i.descriptor.clone()).collect()
    }

    async fn execute(
        &self,
        ast: &QueryNode,
        request: &SearchRequest,
    ) -> Result<NodeSearchOutcome, SearchError> {
        let translated = self.translator.translate(ast);
        let excluded = ExcludedTermFilter::new(&translated.not_terms);
        let structured = compile_structured(ast)?;
        let snippet = self.snippet_options(request);
        let limit = request
            .max_results_per_node
            .unwrap_or(self.settings.default_max_results_per_node);

        let mut outcome = NodeSearchOutcome {
            node_id: self.id.clone(),
            ..Default::default()
        };
        let mut cache = HashMap::new();
        let mut answered = 0usize;

        for index in self
            .indexes
            .iter()
            .filter(|i| i.descriptor.is_selected(request))
        {
            let index_id = &index.descriptor.id;
            let matches = match self
                .query_index(index, &translated.fts_query, limit, &snippet)
                .await
            {
                Ok(matches) => matches,
                Err(reason) if index.descriptor.required => {
                    return Err(SearchError::node_unavailable(
                        &self.id,
                        format!("required index '{index_id}' failed: {reason}"),
                    ));
                }
                Err(reason) => {
                    let err = SearchError::IndexUnavailable {
                        node_id: Some(self.id.clone()),
                        index_id: index_id.clone(),
                        reason,
                    };
                    warn!(node_id = %self.id, index_id = %index_id, error = %err, "Skipping index");
                    outcome.warnings.push(format!("{}: {}", self.id, err));
                    continue;
                }
            };

            answered += 1;
            let found = matches.len();
            let mut kept = 0usize;
            for m in matches {
                let Some(record) = self.hydrate(&mut cache, &m.content_id).await? else {
                    debug!(node_id = %self.id, content_id = %m.content_id, "Indexed record no longer exists");
                    continue;
                };
                if excluded.excludes(&record) {
                    continue;
                }
                if structured.as_ref().is_some_and(|p| !p.matches(&record)) {
                    continue;
                }

                let mut result = SearchIndexResult::from_record(record, &self.id, index_id, m.score);
                if request.snippet_only {
                    result.content = snippet_content(&m.snippet, &result.content, request.snippet_length);
                }
                outcome.results.push(result);
                kept += 1;
            }

            debug!(
                node_id = %self.id,
                index_id = %index_id,
                found,
                kept,
                "Index search completed"
            );
        }

        // Optional index failures only degrade a node that still has a working index
        if answered == 0 && !outcome.warnings.is_empty() {
            return Err(SearchError::node_unavailable(
                &self.id,
                format!("no index answered: {}", outcome.warnings.join("; ")),
            ));
        }

        Ok(outcome)
    }
}

/// Snippet used as result content; falls back to the content itself when
/// the engine produced no snippet.
fn snippet_content(snippet: &str, content: &str, max_chars: Option<usize>) -> String {
    let text = if snippet.is_empty() { content } else { snippet };
    match max_chars {
        Some(max) => text.chars().take(max).collect(),
        None => text.to_string(),
    }
}

/// Scripted node for orchestrator tests.
#[derive(Debug, Clone, Default)]
pub struct MockNodeExecutor {
    pub id: String,
    pub access: NodeAccess,
    pub weight: Option<f32>,
    pub indexes: Vec<IndexDescriptor>,
    /// Returned for every search, filtered by index selection
    pub results: Vec<SearchIndexResult>,
    pub delay: Option<Duration>,
    pub failure: Option<SearchError>,
}

impl MockNodeExecutor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            indexes: vec![IndexDescriptor::new(DEFAULT_INDEX_ID)],
            ..Default::default()
        }
    }

    pub fn with_access(mut self, access: NodeAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_indexes(mut self, indexes: Vec<IndexDescriptor>) -> Self {
        self.indexes = indexes;
        self
    }

    /// Add a hit for `record_id` in the given index.
    pub fn with_hit(mut self, record_id: &str, index_id: &str, base_relevance: f32) -> Self {
        let record = ContentRecord::new(record_id, format!("{} content", record_id));
        self.results.push(SearchIndexResult::from_record(
            record,
            &self.id,
            index_id,
            base_relevance,
        ));
        self
    }

    pub fn with_result(mut self, result: SearchIndexResult) -> Self {
        self.results.push(result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_failure(mut self, failure: SearchError) -> Self {
        self.failure = Some(failure);
        self
    }
}

#[async_trait]
impl NodeExecutor for MockNodeExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn access(&self) -> NodeAccess {
        self.access
    }

    fn weight(&self) -> Option<f32> {
        self.weight
    }

    fn indexes(&self) -> Vec<IndexDescriptor> {
        self.indexes.clone()
    }

    async fn execute(
        &self,
        _ast: &QueryNode,
        request: &SearchRequest,
    ) -> Result<NodeSearchOutcome, SearchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let selected: Vec<&IndexDescriptor> = self
            .indexes
            .iter()
            .filter(|i| i.is_selected(request))
            .collect();
        let results = self
            .results
            .iter()
            .filter(|r| selected.iter().any(|i| i.id == r.index_id))
            .cloned()
            .collect();

        Ok(NodeSearchOutcome {
            node_id: self.id.clone(),
            results,
            ..Default::default()
        })
    }
}
