//! Error taxonomy for federated search.
//!
//! Every variant that relates to a specific node carries its id so callers can
//! narrow the node set and retry.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fieldless discriminant of [`SearchError`], convenient for matching and for
/// transports that only report an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchErrorKind {
    NodeNotFound,
    NodeAccessDenied,
    NodeTimeout,
    NodeUnavailable,
    IndexNotFound,
    IndexUnavailable,
    IndexRequired,
    QuerySyntaxError,
    QueryTooComplex,
    QueryTimeout,
    InvalidConfiguration,
    InvalidNodePrefix,
    InvalidRequest,
}

/// Errors surfaced by search operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    /// A requested node is not configured
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    /// The node exists but its access mode does not allow the operation
    #[error("Access denied to node '{node_id}': {reason}")]
    NodeAccessDenied { node_id: String, reason: String },

    /// The node did not answer within its deadline
    #[error("Node '{node_id}' timed out after {:.3}s", .elapsed.as_secs_f64())]
    NodeTimeout { node_id: String, elapsed: Duration },

    /// The node failed while searching
    #[error("Node '{node_id}' unavailable: {reason}")]
    NodeUnavailable { node_id: String, reason: String },

    /// A requested search index does not exist on any selected node
    #[error("Search index not found: {index_id}")]
    IndexNotFound {
        node_id: Option<String>,
        index_id: String,
    },

    /// A search index failed while searching
    #[error("Search index '{index_id}' unavailable: {reason}")]
    IndexUnavailable {
        node_id: Option<String>,
        index_id: String,
        reason: String,
    },

    /// The request excluded an index that must always be searched
    #[error("Search index '{index_id}' is required and cannot be excluded")]
    IndexRequired {
        node_id: Option<String>,
        index_id: String,
    },

    /// The query could not be parsed
    #[error("Query syntax error at position {position}: {message}")]
    QuerySyntax {
        node_id: Option<String>,
        message: String,
        position: usize,
    },

    /// The parsed query exceeds the configured complexity limits
    #[error("Query too complex: {reason}")]
    QueryTooComplex {
        node_id: Option<String>,
        reason: String,
    },

    /// The whole search exceeded its overall deadline
    #[error("Query timed out after {:.3}s", .elapsed.as_secs_f64())]
    QueryTimeout {
        node_id: Option<String>,
        elapsed: Duration,
    },

    /// Configuration is missing or inconsistent
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        node_id: Option<String>,
        reason: String,
    },

    /// A node-qualified id has a malformed node prefix
    #[error("Invalid node prefix in '{value}'")]
    InvalidNodePrefix {
        node_id: Option<String>,
        value: String,
    },

    /// The request itself is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SearchError {
    /// The node this error relates to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            SearchError::NodeNotFound { node_id }
            | SearchError::NodeAccessDenied { node_id, .. }
            | SearchError::NodeTimeout { node_id, .. }
            | SearchError::NodeUnavailable { node_id, .. } => Some(node_id),
            SearchError::IndexNotFound { node_id, .. }
            | SearchError::IndexUnavailable { node_id, .. }
            | SearchError::IndexRequired { node_id, .. }
            | SearchError::QuerySyntax { node_id, .. }
            | SearchError::QueryTooComplex { node_id, .. }
            | SearchError::QueryTimeout { node_id, .. }
            | SearchError::InvalidConfiguration { node_id, .. }
            | SearchError::InvalidNodePrefix { node_id, .. } => node_id.as_deref(),
            SearchError::InvalidRequest(_) => None,
        }
    }

    pub fn kind(&self) -> SearchErrorKind {
        match self {
            SearchError::NodeNotFound { .. } => SearchErrorKind::NodeNotFound,
            SearchError::NodeAccessDenied { .. } => SearchErrorKind::NodeAccessDenied,
            SearchError::NodeTimeout { .. } => SearchErrorKind::NodeTimeout,
            SearchError::NodeUnavailable { .. } => SearchErrorKind::NodeUnavailable,
            SearchError::IndexNotFound { .. } => SearchErrorKind::IndexNotFound,
            SearchError::IndexUnavailable { .. } => SearchErrorKind::IndexUnavailable,
            SearchError::IndexRequired { .. } => SearchErrorKind::IndexRequired,
            SearchError::QuerySyntax { .. } => SearchErrorKind::QuerySyntaxError,
            SearchError::QueryTooComplex { .. } => SearchErrorKind::QueryTooComplex,
            SearchError::QueryTimeout { .. } => SearchErrorKind::QueryTimeout,
            SearchError::InvalidConfiguration { .. } => SearchErrorKind::InvalidConfiguration,
            SearchError::InvalidNodePrefix { .. } => SearchErrorKind::InvalidNodePrefix,
            SearchError::InvalidRequest(_) => SearchErrorKind::InvalidRequest,
        }
    }

    pub fn node_unavailable(node_id: impl Into<String>, reason: impl ToString) -> Self {
        SearchError::NodeUnavailable {
            node_id: node_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        SearchError::InvalidConfiguration {
            node_id: None,
            reason: reason.into(),
        }
    }

    pub fn query_too_complex(reason: impl Into<String>) -> Self {
        SearchError::QueryTooComplex {
            node_id: None,
            reason: reason.into(),
        }
    }

    /// Attribute an error to a node. Errors that already name a node keep it.
    pub fn for_node(mut self, id: impl Into<String>) -> Self {
        match &mut self {
            SearchError::IndexNotFound { node_id, .. }
            | SearchError::IndexUnavailable { node_id, .. }
            | SearchError::IndexRequired { node_id, .. }
            | SearchError::QuerySyntax { node_id, .. }
            | SearchError::QueryTooComplex { node_id, .. }
            | SearchError::QueryTimeout { node_id, .. }
            | SearchError::InvalidConfiguration { node_id, .. }
            | SearchError::InvalidNodePrefix { node_id, .. } => {
                if node_id.is_none() {
                    *node_id = Some(id.into());
                }
            }
            _ => {}
        }
        self
    }
}
