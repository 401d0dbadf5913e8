//! Query error types.

use memory_types::SearchError;
use thiserror::Error;

use crate::ast::{ComparisonOperator, LogicalOperator};

/// Raised by a query parser on malformed input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Syntax error at position {position}: {message}")]
pub struct QuerySyntaxError {
    pub message: String,
    /// Character offset of the offending input
    pub position: usize,
}

impl QuerySyntaxError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl From<QuerySyntaxError> for SearchError {
    fn from(e: QuerySyntaxError) -> Self {
        SearchError::QuerySyntax {
            node_id: None,
            message: e.message,
            position: e.position,
        }
    }
}

/// Errors raised while compiling a query tree into a record predicate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    /// Field name is not a record field
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Dotted path outside of `metadata.*`
    #[error("Nested field not supported: {0}")]
    NestedFieldNotSupported(String),

    /// Operator cannot be applied to the field
    #[error("Operator {operator:?} is not supported on field '{field}'")]
    UnsupportedOperator {
        field: String,
        operator: ComparisonOperator,
    },

    /// Literal has the wrong type for the field or operator
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Logical node without children
    #[error("{0:?} node has no children")]
    EmptyLogicalNode(LogicalOperator),

    /// Node cannot stand alone as a condition
    #[error("Not a condition: {0}")]
    NotACondition(String),
}

impl From<CompileError> for SearchError {
    fn from(e: CompileError) -> Self {
        SearchError::InvalidRequest(e.to_string())
    }
}
