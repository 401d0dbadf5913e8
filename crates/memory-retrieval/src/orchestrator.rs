//! Cross-node search orchestration.
//!
//! Selects nodes and indexes, parses the query once, searches every selected
//! node in parallel, then reranks, filters and paginates the merged results.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use memory_query::{compile_structured, PlainTextParser, QueryNode, QueryParser};
use memory_types::{
    FailurePolicy, NodeSettings, QueryValidation, RerankingConfig, SearchError, SearchMetadata,
    SearchRequest, SearchResponse, SearchSettings, Settings,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::content::ContentStore;
use crate::node::{search_node, NodeExecutor, NodeSearchOutcome, NodeSearcher};
use crate::rerank::Reranker;

pub struct SearchOrchestrator {
    nodes: BTreeMap<String, Arc<dyn NodeExecutor>>,
    parser: Arc<dyn QueryParser>,
    settings: Arc<SearchSettings>,
}

impl SearchOrchestrator {
    /// Create an orchestrator with no nodes and the plain-text parser.
    pub fn new(settings: SearchSettings) -> Self {
        Self::with_shared_settings(Arc::new(settings))
    }

    fn with_shared_settings(settings: Arc<SearchSettings>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            parser: Arc::new(PlainTextParser),
            settings,
        }
    }

    /// Build FTS-backed nodes from validated settings.
    ///
    /// `store_for` supplies the content store of each configured node.
    pub fn from_settings<F>(settings: &Settings, mut store_for: F) -> Result<Self, SearchError>
    where
        F: FnMut(&NodeSettings) -> Arc<dyn ContentStore>,
    {
        settings.validate()?;
        let search = Arc::new(settings.search.clone());

        let mut orchestrator = Self::with_shared_settings(Arc::clone(&search));
        for node in settings.nodes.values() {
            let searcher = NodeSearcher::from_settings(node, store_for(node), Arc::clone(&search));
            orchestrator = orchestrator.with_node(Arc::new(searcher));
        }

        info!(nodes = orchestrator.nodes.len(), "Search orchestrator ready");
        Ok(orchestrator)
    }

    pub fn with_parser<P>(mut self, parser: P) -> Self
    where
        P: QueryParser + 'static,
    {
        self.parser = Arc::new(parser);
        self
    }

    /// Register a node; a node with the same id is replaced.
    pub fn with_node(mut self, node: Arc<dyn NodeExecutor>) -> Self {
        self.nodes.insert(node.id().to_string(), node);
        self
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Parse and check a query without searching.
    pub fn validate_query(&self, query: &str) -> QueryValidation {
        match self.parse(query) {
            Ok(_) => QueryValidation::valid(),
            Err(e) => QueryValidation::invalid(&e),
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let start = Instant::now();
        request.validate()?;

        let nodes = self.select_nodes(request)?;
        self.check_indexes(&nodes, request)?;
        let ast = Arc::new(self.parse(&request.query)?);

        debug!(
            query = %request.query,
            nodes = nodes.len(),
            "Dispatching search"
        );

        let (outcomes, node_failures) = self.dispatch(&nodes, ast, request).await?;

        let mut metadata = SearchMetadata {
            nodes_requested: nodes.len(),
            ..Default::default()
        };
        let mut merged = Vec::new();
        for outcome in outcomes {
            metadata.nodes_searched += 1;
            metadata
                .node_timings_ms
                .insert(outcome.node_id, outcome.elapsed.as_millis() as u64);
            metadata.warnings.extend(outcome.warnings);
            merged.extend(outcome.results);
        }
        metadata
            .warnings
            .extend(node_failures.iter().map(ToString::to_string));

        let reranker = Reranker::new(self.reranking_config(&nodes, request));
        let ranked: Vec<_> = reranker
            .rerank(merged)
            .into_iter()
            .filter(|r| r.relevance >= request.min_relevance)
            .collect();

        let total_results = ranked.len();
        let results = ranked
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect::<Vec<_>>();

        metadata.execution_time_ms = start.elapsed().as_millis() as u64;
        info!(
            query = %request.query,
            nodes = metadata.nodes_searched,
            total_results,
            returned = results.len(),
            elapsed_ms = metadata.execution_time_ms,
            "Search completed"
        );

        Ok(SearchResponse {
            query: request.query.clone(),
            total_results,
            results,
            metadata,
        })
    }

    fn parse(&self, query: &str) -> Result<QueryNode, SearchError> {
        let ast = self.parser.parse(query)?;

        let depth = ast.depth();
        if depth > self.settings.max_query_depth {
            return Err(SearchError::query_too_complex(format!(
                "depth {} exceeds limit {}",
                depth, self.settings.max_query_depth
            )));
        }
        let count = ast.node_count();
        if count > self.settings.max_query_nodes {
            return Err(SearchError::query_too_complex(format!(
                "{} nodes exceed limit {}",
                count, self.settings.max_query_nodes
            )));
        }

        // Surfaces unknown fields and bad literals before any node is queried
        compile_structured(&ast)?;
        Ok(ast)
    }

    fn select_nodes(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<Arc<dyn NodeExecutor>>, SearchError> {
        if self.nodes.is_empty() {
            return Err(SearchError::invalid_configuration(
                "no nodes configured".to_string(),
            ));
        }

        let explicit = !request.nodes.is_empty();
        let mut ids: Vec<&str> = if explicit {
            request.nodes.iter().map(String::as_str).collect()
        } else {
            self.node_ids().collect()
        };
        ids.retain(|id| !request.exclude_nodes.iter().any(|ex| ex.as_str() == *id));
        let mut seen = std::collections::HashSet::new();
        ids.retain(|id| seen.insert(*id));

        if ids.is_empty() {
            return Err(SearchError::invalid_configuration(
                "no nodes left to search after exclusions".to_string(),
            ));
        }

        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| SearchError::NodeNotFound {
                    node_id: id.to_string(),
                })?;

            if !node.access().can_search() {
                if explicit {
                    return Err(SearchError::NodeAccessDenied {
                        node_id: id.to_string(),
                        reason: "node is write-only".to_string(),
                    });
                }
                debug!(node_id = %id, "Skipping write-only node");
                continue;
            }
            selected.push(Arc::clone(node));
        }

        if selected.is_empty() {
            return Err(SearchError::invalid_configuration(
                "no searchable nodes selected".to_string(),
            ));
        }
        Ok(selected)
    }

    fn check_indexes(
        &self,
        nodes: &[Arc<dyn NodeExecutor>],
        request: &SearchRequest,
    ) -> Result<(), SearchError> {
        let descriptors: Vec<(&str, Vec<_>)> =
            nodes.iter().map(|n| (n.id(), n.indexes())).collect();

        for index_id in &request.search_indexes {
            let known = descriptors
                .iter()
                .any(|(_, indexes)| indexes.iter().any(|i| &i.id == index_id));
            if !known {
                return Err(SearchError::IndexNotFound {
                    node_id: None,
                    index_id: index_id.clone(),
                });
            }
        }

        for (node_id, indexes) in &descriptors {
            if let Some(index) = indexes
                .iter()
                .find(|i| i.required && request.exclude_indexes.contains(&i.id))
            {
                return Err(SearchError::IndexRequired {
                    node_id: Some(node_id.to_string()),
                    index_id: index.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Search every node in parallel under the overall deadline.
    ///
    /// Returns the successful outcomes and, under the partial policy, the
    /// errors of nodes that failed.
    async fn dispatch(
        &self,
        nodes: &[Arc<dyn NodeExecutor>],
        ast: Arc<QueryNode>,
        request: &SearchRequest,
    ) -> Result<(Vec<NodeSearchOutcome>, Vec<SearchError>), SearchError> {
        let start = Instant::now();
        let parent = CancellationToken::new();
        let policy = self.settings.failure_policy;
        let default_timeout = Duration::from_secs(self.settings.default_timeout_secs);
        let overall = Duration::from_secs(self.settings.query_timeout_secs);
        let request = Arc::new(request.clone());
        let first_failure: Arc<Mutex<Option<SearchError>>> = Arc::new(Mutex::new(None));

        let handles: Vec<_> = nodes
            .iter()
            .map(|node| {
                let node = Arc::clone(node);
                let ast = Arc::clone(&ast);
                let request = Arc::clone(&request);
                let token = parent.child_token();
                let parent = parent.clone();
                let first_failure = Arc::clone(&first_failure);

                tokio::spawn(async move {
                    let result =
                        search_node(node.as_ref(), &ast, &request, default_timeout, &token).await;
                    if let Err(e) = &result {
                        record_failure(&first_failure, e);
                        if policy == FailurePolicy::FailFast {
                            parent.cancel();
                        }
                    }
                    (node.id().to_string(), result)
                })
            })
            .collect();

        let joined = match tokio::time::timeout(overall, futures::future::join_all(handles)).await {
            Ok(joined) => joined,
            Err(_) => {
                parent.cancel();
                warn!(elapsed_ms = start.elapsed().as_millis() as u64, "Search timed out");
                return Err(SearchError::QueryTimeout {
                    node_id: None,
                    elapsed: start.elapsed(),
                });
            }
        };

        let mut outcomes = Vec::with_capacity(joined.len());
        let mut failures = Vec::new();
        for (i, joined) in joined.into_iter().enumerate() {
            let (node_id, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    let node_id = nodes[i].id().to_string();
                    let err = SearchError::node_unavailable(&node_id, format!("search task failed: {e}"));
                    record_failure(&first_failure, &err);
                    (node_id, Err(err))
                }
            };
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(node_id = %node_id, error = %e, "Node failed");
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            return Ok((outcomes, failures));
        }

        let first = first_failure
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .or_else(|| failures.first().cloned());

        match (policy, first) {
            (FailurePolicy::Partial, _) if !outcomes.is_empty() => Ok((outcomes, failures)),
            (_, Some(first)) => Err(first),
            (_, None) => Err(failures.remove(0)),
        }
    }

    /// Node weights: request override, then node configuration, then
    /// default. Index weights come from node configuration.
    fn reranking_config(
        &self,
        nodes: &[Arc<dyn NodeExecutor>],
        request: &SearchRequest,
    ) -> RerankingConfig {
        let mut config = self.settings.base_reranking_config();
        for node in nodes {
            if let Some(weight) = node.weight() {
                config.node_weights.insert(node.id().to_string(), weight);
            }
            for index in node.indexes() {
                if let Some(weight) = index.weight {
                    config
                        .index_weights
                        .entry(node.id().to_string())
                        .or_default()
                        .insert(index.id, weight);
                }
            }
        }
        if let Some(weights) = &request.node_weights {
            config
                .node_weights
                .extend(weights.iter().map(|(id, w)| (id.clone(), *w)));
        }
        config
    }
}

fn record_failure(slot: &Mutex<Option<SearchError>>, error: &SearchError) {
    if let Ok(mut slot) = slot.lock() {
        if slot.is_none() {
            *slot = Some(error.clone());
        }
    }
}
