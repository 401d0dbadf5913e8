//! Query abstract syntax tree.
//!
//! Produced by a [`QueryParser`](crate::QueryParser) and consumed by the
//! predicate compiler and the FTS translator. Trees are immutable once built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix marking a dotted field path as a metadata lookup.
const METADATA_PREFIX: &str = "metadata.";

/// A node of the query tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryNode {
    Logical(LogicalNode),
    Comparison(ComparisonNode),
    TextSearch(TextSearchNode),
    Field(FieldNode),
    Literal(LiteralNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    And,
    Or,
    /// Negates its first child; further children are ignored
    Not,
    Nor,
}

impl LogicalOperator {
    pub fn is_negation(&self) -> bool {
        matches!(self, LogicalOperator::Not | LogicalOperator::Nor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalNode {
    pub operator: LogicalOperator,
    pub children: Vec<QueryNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    In,
    NotIn,
    Exists,
}

impl ComparisonOperator {
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::GreaterThan
                | ComparisonOperator::GreaterThanOrEqual
                | ComparisonOperator::LessThan
                | ComparisonOperator::LessThanOrEqual
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonNode {
    pub field: FieldNode,
    pub operator: ComparisonOperator,
    pub value: LiteralNode,
}

/// Free-text search, optionally scoped to one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSearchNode {
    #[serde(default)]
    pub field: Option<FieldNode>,
    pub search_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNode {
    pub field_path: String,
    pub is_metadata_field: bool,
    #[serde(default)]
    pub metadata_key: Option<String>,
}

impl FieldNode {
    /// Build a field reference; `metadata.<key>` paths become metadata lookups.
    pub fn new(path: impl Into<String>) -> Self {
        let field_path = path.into();
        let metadata_key = field_path
            .get(..METADATA_PREFIX.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(METADATA_PREFIX))
            .and_then(|_| field_path.get(METADATA_PREFIX.len()..))
            .filter(|key| !key.is_empty())
            .map(str::to_string);

        Self {
            is_metadata_field: metadata_key.is_some(),
            field_path,
            metadata_key,
        }
    }

    pub fn metadata(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            field_path: format!("{METADATA_PREFIX}{key}"),
            is_metadata_field: true,
            metadata_key: Some(key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralNode {
    pub value: QueryValue,
}

/// A literal value appearing in a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime<Utc>),
    String(String),
    List(Vec<QueryValue>),
}

impl QueryValue {
    /// Text form used for string comparisons and full-text terms.
    pub fn as_text(&self) -> Option<String> {
        match self {
            QueryValue::String(s) => Some(s.clone()),
            QueryValue::Number(n) => Some(format_number(*n)),
            QueryValue::Bool(b) => Some(b.to_string()),
            QueryValue::DateTime(d) => Some(d.to_rfc3339()),
            QueryValue::Null | QueryValue::List(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            QueryValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// List items, or the value itself as a one-element list.
    pub fn items(&self) -> Vec<&QueryValue> {
        match self {
            QueryValue::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        QueryValue::String(s.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        QueryValue::String(s)
    }
}

impl From<f64> for QueryValue {
    fn from(n: f64) -> Self {
        QueryValue::Number(n)
    }
}

impl From<bool> for QueryValue {
    fn from(b: bool) -> Self {
        QueryValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for QueryValue {
    fn from(d: DateTime<Utc>) -> Self {
        QueryValue::DateTime(d)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(items: Vec<T>) -> Self {
        QueryValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl QueryNode {
    pub fn logical(operator: LogicalOperator, children: Vec<QueryNode>) -> Self {
        QueryNode::Logical(LogicalNode { operator, children })
    }

    pub fn and(children: Vec<QueryNode>) -> Self {
        Self::logical(LogicalOperator::And, children)
    }

    pub fn or(children: Vec<QueryNode>) -> Self {
        Self::logical(LogicalOperator::Or, children)
    }

    pub fn not(child: QueryNode) -> Self {
        Self::logical(LogicalOperator::Not, vec![child])
    }

    pub fn nor(children: Vec<QueryNode>) -> Self {
        Self::logical(LogicalOperator::Nor, children)
    }

    /// Free-text search over all full-text fields.
    pub fn text(search_text: impl Into<String>) -> Self {
        QueryNode::TextSearch(TextSearchNode {
            field: None,
            search_text: search_text.into(),
        })
    }

    /// Free-text search scoped to one field.
    pub fn field_text(field: &str, search_text: impl Into<String>) -> Self {
        QueryNode::TextSearch(TextSearchNode {
            field: Some(FieldNode::new(field)),
            search_text: search_text.into(),
        })
    }

    pub fn compare(
        field: &str,
        operator: ComparisonOperator,
        value: impl Into<QueryValue>,
    ) -> Self {
        QueryNode::Comparison(ComparisonNode {
            field: FieldNode::new(field),
            operator,
            value: LiteralNode {
                value: value.into(),
            },
        })
    }

    pub fn eq(field: &str, value: impl Into<QueryValue>) -> Self {
        Self::compare(field, ComparisonOperator::Equal, value)
    }

    pub fn ne(field: &str, value: impl Into<QueryValue>) -> Self {
        Self::compare(field, ComparisonOperator::NotEqual, value)
    }

    pub fn exists(field: &str) -> Self {
        Self::compare(field, ComparisonOperator::Exists, true)
    }

    pub fn literal(value: impl Into<QueryValue>) -> Self {
        QueryNode::Literal(LiteralNode {
            value: value.into(),
        })
    }

    /// Height of the tree; a single leaf has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            QueryNode::Logical(node) => {
                1 + node.children.iter().map(QueryNode::depth).max().unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Total number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        match self {
            QueryNode::Logical(node) => {
                1 + node.children.iter().map(QueryNode::node_count).sum::<usize>()
            }
            _ => 1,
        }
    }

    /// Whether any negation appears in the tree.
    pub fn contains_negation(&self) -> bool {
        match self {
            QueryNode::Logical(node) => {
                node.operator.is_negation() || node.children.iter().any(QueryNode::contains_negation)
            }
            _ => false,
        }
    }
}
