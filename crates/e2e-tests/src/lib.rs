//! End-to-end test infrastructure for federated memory search.
//!
//! Provides a shared TestHarness that lays out nodes, their FTS index
//! files and content stores under a temp directory, then builds a
//! [`SearchOrchestrator`] over them the same way a host application would.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use chrono::{DateTime, TimeZone, Utc};

use memory_retrieval::{ContentStore, InMemoryContentStore, SearchOrchestrator};
use memory_search::{FtsIndex, FtsIndexConfig};
use memory_types::{
    ContentRecord, FailurePolicy, NodeSettings, SearchIndexSettings, SearchResponse, Settings,
};

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process.
///
/// Honors `RUST_LOG`, defaulting to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Settings the orchestrator is built from
    pub settings: Settings,
    stores: BTreeMap<String, Arc<InMemoryContentStore>>,
    writers: BTreeMap<String, Vec<(String, Arc<FtsIndex>)>>,
}

impl TestHarness {
    /// Create a harness with no nodes.
    pub fn new() -> Self {
        init_tracing();
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        Self {
            _temp_dir: temp_dir,
            settings: Settings::default(),
            stores: BTreeMap::new(),
            writers: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Path of an index database for `node_id` inside the temp directory.
    pub fn index_path(&self, node_id: &str, index_id: &str) -> PathBuf {
        self.root().join(node_id).join(format!("{index_id}.db"))
    }

    /// Add a node with one stemmed FTS index per id in `index_ids`.
    pub fn add_node(&mut self, node_id: &str, index_ids: &[&str]) -> &mut Self {
        let mut node = NodeSettings::new(node_id);
        for index_id in index_ids {
            node = node.with_index(SearchIndexSettings::new(
                *index_id,
                self.index_path(node_id, index_id),
            ));
        }
        self.add_node_settings(node)
    }

    /// Add a fully configured node.
    pub fn add_node_settings(&mut self, node: NodeSettings) -> &mut Self {
        let writers = node
            .search_indexes
            .iter()
            .map(|index| {
                let engine = FtsIndex::new(FtsIndexConfig::from_settings(index));
                (index.id.clone(), Arc::new(engine))
            })
            .collect();
        self.writers.insert(node.id.clone(), writers);
        self.stores
            .insert(node.id.clone(), Arc::new(InMemoryContentStore::new()));
        self.settings = std::mem::take(&mut self.settings).with_node(node);
        self
    }

    pub fn with_failure_policy(&mut self, policy: FailurePolicy) -> &mut Self {
        self.settings.search.failure_policy = policy;
        self
    }

    /// Store a record on a node and index it into every index of that node.
    pub fn put(&self, node_id: &str, record: ContentRecord) {
        self.put_where(node_id, record, |_| true);
    }

    /// Store a record on a node and index it into one of its indexes only.
    pub fn put_in_index(&self, node_id: &str, index_id: &str, record: ContentRecord) {
        self.put_where(node_id, record, |id| id == index_id);
    }

    fn put_where(&self, node_id: &str, record: ContentRecord, select: impl Fn(&str) -> bool) {
        let writers = self
            .writers
            .get(node_id)
            .unwrap_or_else(|| panic!("unknown node {node_id}"));
        for (_, writer) in writers.iter().filter(|(id, _)| select(id)) {
            writer
                .index(
                    &record.id,
                    record.title.as_deref(),
                    record.description.as_deref(),
                    &record.content,
                )
                .expect("Failed to index record");
        }
        self.stores[node_id]
            .put(record)
            .expect("Failed to store record");
    }

    /// Store a record into the content store only, leaving indexes untouched.
    pub fn put_unindexed(&self, node_id: &str, record: ContentRecord) {
        self.stores[node_id]
            .put(record)
            .expect("Failed to store record");
    }

    /// Remove a record from a node's indexes and content store.
    pub fn remove(&self, node_id: &str, record_id: &str) {
        for (_, writer) in &self.writers[node_id] {
            writer.remove(record_id).expect("Failed to remove record");
        }
        self.stores[node_id]
            .remove(record_id)
            .expect("Failed to remove record");
    }

    /// Build an orchestrator over the current settings.
    pub fn orchestrator(&self) -> SearchOrchestrator {
        SearchOrchestrator::from_settings(&self.settings, |node| {
            let store: Arc<dyn ContentStore> = self.stores[&node.id].clone();
            store
        })
        .expect("Failed to build orchestrator")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic timestamp `minutes` after a fixed base.
pub fn timestamp(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 29, 15, 0, 0)
        .single()
        .expect("valid base timestamp")
        + chrono::Duration::minutes(minutes)
}

/// Record with a title and deterministic creation time.
pub fn record(id: &str, title: &str, content: &str, minutes: i64) -> ContentRecord {
    ContentRecord::new(id, content)
        .with_title(title)
        .with_created_at(timestamp(minutes))
}

/// Result ids in response order.
pub fn result_ids(response: &SearchResponse) -> Vec<&str> {
    response.results.iter().map(|r| r.id.as_str()).collect()
}
