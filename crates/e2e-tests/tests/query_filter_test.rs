//! Structured query E2E tests.
//!
//! Queries mixing free text, negation and field conditions are answered by
//! the FTS engine and then filtered against hydrated records.

use std::collections::HashMap;

use pretty_assertions::assert_eq;

use e2e_tests::{record, result_ids, timestamp, TestHarness};
use memory_query::{ComparisonOperator, QueryNode, QuerySyntaxError};
use memory_retrieval::SearchOrchestrator;
use memory_types::{SearchErrorKind, SearchRequest};

/// Parser resolving a fixed set of named queries.
fn named_queries(
    queries: Vec<(&str, QueryNode)>,
) -> impl Fn(&str) -> Result<QueryNode, QuerySyntaxError> + Send + Sync {
    let queries: HashMap<String, QueryNode> = queries
        .into_iter()
        .map(|(name, ast)| (name.to_string(), ast))
        .collect();
    move |q: &str| {
        queries
            .get(q)
            .cloned()
            .ok_or_else(|| QuerySyntaxError::new(format!("unknown query '{q}'"), 0))
    }
}

fn harness() -> TestHarness {
    let mut harness = TestHarness::new();
    harness.add_node("ops", &["fts"]);

    harness.put(
        "ops",
        record("d1", "Deploy", "deploy api to production", 0)
            .with_tags(["work", "release"])
            .with_metadata("priority", "1"),
    );
    harness.put(
        "ops",
        record("d2", "Deploy", "deploy api to staging", 10)
            .with_tags(["work"])
            .with_metadata("priority", "3"),
    );
    harness.put(
        "ops",
        record("d3", "Deploy", "deploy blog to staging", 20).with_tags(["personal"]),
    );
    harness
}

fn orchestrator(harness: &TestHarness) -> SearchOrchestrator {
    harness.orchestrator().with_parser(named_queries(vec![
        (
            "deploy-not-staging",
            QueryNode::and(vec![
                QueryNode::text("deploy"),
                QueryNode::not(QueryNode::text("staging")),
            ]),
        ),
        (
            "deploy-work",
            QueryNode::and(vec![QueryNode::text("deploy"), QueryNode::eq("tags", "work")]),
        ),
        (
            "urgent",
            QueryNode::compare("metadata.priority", ComparisonOperator::LessThan, 2.0),
        ),
        (
            "recent-staging",
            QueryNode::and(vec![
                QueryNode::field_text("content", "staging"),
                QueryNode::compare(
                    "createdAt",
                    ComparisonOperator::GreaterThan,
                    timestamp(15),
                ),
            ]),
        ),
        (
            "neither-api-nor-blog",
            QueryNode::nor(vec![QueryNode::text("api"), QueryNode::text("blog")]),
        ),
        ("too-deep", deep_query(40)),
    ]))
}

fn deep_query(depth: usize) -> QueryNode {
    (0..depth).fold(QueryNode::text("deploy"), |inner, _| {
        QueryNode::and(vec![inner])
    })
}

async fn ids(orchestrator: &SearchOrchestrator, query: &str) -> Vec<String> {
    let response = orchestrator.search(&SearchRequest::new(query)).await.unwrap();
    let mut ids: Vec<String> = result_ids(&response)
        .into_iter()
        .map(str::to_string)
        .collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn test_negated_text_is_filtered_out() {
    let harness = harness();
    let orchestrator = orchestrator(&harness);
    assert_eq!(ids(&orchestrator, "deploy-not-staging").await, vec!["d1"]);
}

#[tokio::test]
async fn test_text_with_tag_condition() {
    let harness = harness();
    let orchestrator = orchestrator(&harness);
    assert_eq!(ids(&orchestrator, "deploy-work").await, vec!["d1", "d2"]);
}

#[tokio::test]
async fn test_metadata_only_query_scans_every_record() {
    let harness = harness();
    let orchestrator = orchestrator(&harness);
    assert_eq!(ids(&orchestrator, "urgent").await, vec!["d1"]);
}

#[tokio::test]
async fn test_field_text_with_date_condition() {
    let harness = harness();
    let orchestrator = orchestrator(&harness);
    assert_eq!(ids(&orchestrator, "recent-staging").await, vec!["d3"]);
}

#[tokio::test]
async fn test_nor_excludes_every_listed_term() {
    let harness = harness();
    let orchestrator = orchestrator(&harness);
    assert!(ids(&orchestrator, "neither-api-nor-blog").await.is_empty());
}

#[tokio::test]
async fn test_query_errors_surface_before_dispatch() {
    let harness = harness();
    let orchestrator = orchestrator(&harness);

    let err = orchestrator
        .search(&SearchRequest::new("no-such-query"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SearchErrorKind::QuerySyntaxError);

    let err = orchestrator
        .search(&SearchRequest::new("too-deep"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SearchErrorKind::QueryTooComplex);

    let validation = orchestrator.validate_query("no-such-query");
    assert!(!validation.valid);
    assert!(orchestrator.validate_query("deploy-work").valid);
}
