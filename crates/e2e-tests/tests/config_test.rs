//! Configuration-driven E2E tests.
//!
//! Load settings from a JSON file, build the orchestrator from them and
//! check that configured access modes and weights reach the search.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::init_tracing;
use memory_retrieval::{ContentStore, InMemoryContentStore, SearchOrchestrator};
use memory_search::{FtsIndex, FtsIndexConfig};
use memory_types::{ContentRecord, SearchErrorKind, SearchRequest, Settings};

struct Fixture {
    _temp_dir: tempfile::TempDir,
    settings: Settings,
    store: Arc<InMemoryContentStore>,
}

/// Two readable nodes sharing one content store plus a write-only inbox.
fn fixture() -> Fixture {
    init_tracing();
    let temp_dir = tempfile::TempDir::new().unwrap();
    let root = temp_dir.path();

    let config = json!({
        "log_level": "debug",
        "search": { "failure_policy": "partial", "default_timeout_secs": 10 },
        "nodes": {
            "primary": {
                "id": "primary",
                "weight": 1.0,
                "search_indexes": [
                    { "id": "fts", "path": root.join("primary.db"), "required": true }
                ]
            },
            "mirror": {
                "id": "mirror",
                "access": "read_only",
                "weight": 0.5,
                "search_indexes": [
                    { "id": "fts", "path": root.join("mirror.db"), "required": true }
                ]
            },
            "inbox": {
                "id": "inbox",
                "access": "write_only",
                "search_indexes": [
                    { "id": "fts", "path": root.join("inbox.db") }
                ]
            }
        }
    });
    let config_path = root.join("config.json");
    std::fs::write(&config_path, serde_json::to_vec_pretty(&config).unwrap()).unwrap();

    let settings = Settings::load(Some(config_path.to_str().unwrap())).unwrap();

    let store = Arc::new(InMemoryContentStore::new());
    for node in settings.nodes.values() {
        let engine = FtsIndex::open(FtsIndexConfig::from_settings(&node.search_indexes[0])).unwrap();
        let id = format!("{}-note", node.id);
        let record = ContentRecord::new(&id, "architecture decision record");
        engine.index(&id, None, None, &record.content).unwrap();
        engine.close().unwrap();
        store.put(record).unwrap();
    }

    Fixture {
        _temp_dir: temp_dir,
        settings,
        store,
    }
}

fn orchestrator(fixture: &Fixture) -> SearchOrchestrator {
    SearchOrchestrator::from_settings(&fixture.settings, |_| {
        let store: Arc<dyn ContentStore> = fixture.store.clone();
        store
    })
    .unwrap()
}

#[tokio::test]
async fn test_loaded_settings_drive_search() {
    let fixture = fixture();
    assert_eq!(fixture.settings.log_level, "debug");
    assert_eq!(fixture.settings.nodes.len(), 3);

    let orchestrator = orchestrator(&fixture);
    assert_eq!(
        orchestrator.node_ids().collect::<Vec<_>>(),
        vec!["inbox", "mirror", "primary"]
    );

    let response = orchestrator
        .search(&SearchRequest::new("architecture"))
        .await
        .unwrap();

    // The write-only inbox is skipped silently when not asked for by name.
    assert_eq!(response.metadata.nodes_requested, 2);
    let ids: Vec<_> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["primary-note", "mirror-note"]);

    let primary = &response.results[0];
    let mirror = &response.results[1];
    assert!(
        mirror.relevance < primary.relevance,
        "configured weight 0.5 should rank the mirror lower: {} vs {}",
        mirror.relevance,
        primary.relevance
    );
}

#[tokio::test]
async fn test_request_weight_overrides_configuration() {
    let fixture = fixture();
    let orchestrator = orchestrator(&fixture);

    let response = orchestrator
        .search(
            &SearchRequest::new("architecture")
                .with_node_weight("primary", 0.4)
                .with_node_weight("mirror", 1.0),
        )
        .await
        .unwrap();

    assert_eq!(response.results[0].id, "mirror-note");
}

#[tokio::test]
async fn test_write_only_node_cannot_be_searched_by_name() {
    let fixture = fixture();
    let err = orchestrator(&fixture)
        .search(&SearchRequest::new("architecture").with_nodes(["inbox"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), SearchErrorKind::NodeAccessDenied);
    assert_eq!(err.node_id(), Some("inbox"));
}
