//! Search pipeline E2E tests.
//!
//! Index records on several nodes, search through the orchestrator and
//! verify ranking, merging, pagination and response metadata.

use pretty_assertions::assert_eq;

use e2e_tests::{record, result_ids, TestHarness};
use memory_types::{ContentRecord, SearchErrorKind, SearchRequest};

fn two_node_harness() -> TestHarness {
    let mut harness = TestHarness::new();
    harness.add_node("work", &["fts"]);
    harness.add_node("personal", &["fts"]);

    harness.put(
        "work",
        record("w1", "Deploy checklist", "Steps to deploy the billing service", 0),
    );
    harness.put(
        "work",
        record("w2", "Retro notes", "The team discussed sprint velocity", 1),
    );
    harness.put(
        "personal",
        record("p1", "Garden", "Plant tomatoes before the first deploy of summer", 2),
    );
    harness
}

#[tokio::test]
async fn test_search_merges_results_from_all_nodes() {
    let harness = two_node_harness();
    let orchestrator = harness.orchestrator();

    let response = orchestrator
        .search(&SearchRequest::new("deploy"))
        .await
        .unwrap();

    assert_eq!(response.query, "deploy");
    assert_eq!(response.total_results, 2);
    let mut ids = result_ids(&response);
    ids.sort_unstable();
    assert_eq!(ids, vec!["p1", "w1"]);

    for result in &response.results {
        assert!(result.relevance > 0.0 && result.relevance <= 1.0);
        let qualified = result.qualified_id();
        assert_eq!(qualified.node_id, result.node_id);
        assert_eq!(qualified.record_id, result.id);
    }

    let w1 = response.results.iter().find(|r| r.id == "w1").unwrap();
    assert_eq!(w1.node_id, "work");
    assert_eq!(w1.title.as_deref(), Some("Deploy checklist"));
    assert_eq!(w1.content, "Steps to deploy the billing service");

    assert_eq!(response.metadata.nodes_requested, 2);
    assert_eq!(response.metadata.nodes_searched, 2);
    assert_eq!(response.metadata.node_timings_ms.len(), 2);
    assert!(response.metadata.warnings.is_empty());
}

#[tokio::test]
async fn test_search_restricted_to_one_node() {
    let harness = two_node_harness();
    let orchestrator = harness.orchestrator();

    let response = orchestrator
        .search(&SearchRequest::new("deploy").with_nodes(["personal"]))
        .await
        .unwrap();

    assert_eq!(result_ids(&response), vec!["p1"]);
    assert_eq!(response.metadata.nodes_searched, 1);
}

#[tokio::test]
async fn test_excluded_nodes_are_not_counted_as_requested() {
    let harness = two_node_harness();

    let response = harness
        .orchestrator()
        .search(&SearchRequest::new("deploy").excluding_nodes(["work"]))
        .await
        .unwrap();

    assert_eq!(result_ids(&response), vec!["p1"]);
    assert_eq!(response.metadata.nodes_requested, 1);
    assert_eq!(response.metadata.nodes_searched, 1);
}

#[tokio::test]
async fn test_unknown_node_is_rejected() {
    let harness = two_node_harness();
    let err = harness
        .orchestrator()
        .search(&SearchRequest::new("deploy").with_nodes(["archive"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), SearchErrorKind::NodeNotFound);
    assert_eq!(err.node_id(), Some("archive"));
}

#[tokio::test]
async fn test_equal_scores_are_ordered_newest_first_and_paginated() {
    let mut harness = TestHarness::new();
    harness.add_node("reports", &["fts"]);
    for i in 0..5 {
        harness.put(
            "reports",
            record(&format!("r{i}"), "Report", "weekly status report", i),
        );
    }
    let orchestrator = harness.orchestrator();

    let response = orchestrator
        .search(&SearchRequest::new("report"))
        .await
        .unwrap();
    assert_eq!(result_ids(&response), vec!["r4", "r3", "r2", "r1", "r0"]);

    let page = orchestrator
        .search(&SearchRequest::new("report").with_limit(2).with_offset(2))
        .await
        .unwrap();
    assert_eq!(page.total_results, 5);
    assert_eq!(result_ids(&page), vec!["r2", "r1"]);

    let past_end = orchestrator
        .search(&SearchRequest::new("report").with_offset(10))
        .await
        .unwrap();
    assert_eq!(past_end.total_results, 5);
    assert!(past_end.results.is_empty());
}

#[tokio::test]
async fn test_max_results_per_node_caps_each_node() {
    let mut harness = TestHarness::new();
    harness.add_node("a", &["fts"]);
    harness.add_node("b", &["fts"]);
    for i in 0..4 {
        harness.put("a", record(&format!("a{i}"), "Log", "incident log entry", i));
        harness.put("b", record(&format!("b{i}"), "Log", "incident log entry", i));
    }

    let response = harness
        .orchestrator()
        .search(&SearchRequest::new("incident").with_max_results_per_node(2))
        .await
        .unwrap();

    assert_eq!(response.total_results, 4);
    let from_a = response.results.iter().filter(|r| r.node_id == "a").count();
    let from_b = response.results.iter().filter(|r| r.node_id == "b").count();
    assert_eq!((from_a, from_b), (2, 2));
}

#[tokio::test]
async fn test_record_in_several_indexes_is_returned_once() {
    let mut harness = TestHarness::new();
    harness.add_node("kb", &["titles", "bodies"]);
    harness.put("kb", record("k1", "Rust ownership", "Borrowing rules explained", 0));
    harness.put_in_index("kb", "bodies", record("k2", "Lifetimes", "Rust borrowing", 1));

    let response = harness
        .orchestrator()
        .search(&SearchRequest::new("borrowing"))
        .await
        .unwrap();

    let mut ids = result_ids(&response);
    ids.sort_unstable();
    assert_eq!(ids, vec!["k1", "k2"]);
    assert!(response.results.iter().all(|r| r.relevance <= 1.0));

    let only_titles = harness
        .orchestrator()
        .search(&SearchRequest::new("borrowing").with_indexes(["titles"]))
        .await
        .unwrap();
    assert_eq!(result_ids(&only_titles), vec!["k1"]);
}

#[tokio::test]
async fn test_removed_and_unindexed_records() {
    let mut harness = TestHarness::new();
    harness.add_node("notes", &["fts"]);
    harness.put("notes", ContentRecord::new("n1", "migrate the database"));
    harness.put("notes", ContentRecord::new("n2", "database backups"));
    harness.put_unindexed("notes", ContentRecord::new("n3", "database tuning"));
    harness.remove("notes", "n1");

    let response = harness
        .orchestrator()
        .search(&SearchRequest::new("database"))
        .await
        .unwrap();

    assert_eq!(result_ids(&response), vec!["n2"]);
}

#[tokio::test]
async fn test_snippets_with_highlighting() {
    let mut harness = TestHarness::new();
    harness.add_node("docs", &["fts"]);
    harness.put(
        "docs",
        ContentRecord::new(
            "d1",
            "Kubernetes schedules pods onto nodes and restarts failed containers",
        ),
    );

    let mut request = SearchRequest::new("pods");
    request.snippet_only = true;
    request.highlight = true;

    let response = harness.orchestrator().search(&request).await.unwrap();
    assert_eq!(response.results.len(), 1);
    assert!(
        response.results[0].content.contains("<mark>pods</mark>"),
        "content: {}",
        response.results[0].content
    );

    request.snippet_length = Some(10);
    let response = harness.orchestrator().search(&request).await.unwrap();
    assert_eq!(response.results[0].content.chars().count(), 10);
}

#[tokio::test]
async fn test_min_relevance_above_every_score_returns_nothing() {
    let harness = two_node_harness();
    let response = harness
        .orchestrator()
        .search(&SearchRequest::new("deploy").with_min_relevance(1.0))
        .await
        .unwrap();

    assert!(response.results.iter().all(|r| r.relevance >= 1.0));
    assert_eq!(response.total_results, response.results.len());
}
