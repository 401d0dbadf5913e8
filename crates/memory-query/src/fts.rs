//! Translation of query trees into FTS5 match expressions.
//!
//! Positive terms become engine syntax. Negations are not translated: FTS5's
//! `NOT` needs a positive left operand, so every leaf term under a `Not`/`Nor`
//! is collected into [`NotTerm`]s and excluded after hydration instead. A query
//! made only of negations matches everything (`*`) and relies on that filter.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::{ComparisonOperator, LogicalOperator, QueryNode, QueryValue};
use crate::field::{RecordField, FTS_FIELDS};

/// Match-all query understood by the index engine.
pub const MATCH_ALL: &str = "*";

/// Bare words FTS5 treats as operators.
pub const RESERVED_KEYWORDS: [&str; 4] = ["AND", "OR", "NOT", "NEAR"];

/// A term to exclude by substring matching after hydration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotTerm {
    pub term: String,
    /// Full-text column to test; `None` tests all of them
    pub field: Option<String>,
}

/// Engine query plus the terms it could not express.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtsQueryResult {
    pub fts_query: String,
    pub not_terms: Vec<NotTerm>,
}

impl FtsQueryResult {
    pub fn is_match_all(&self) -> bool {
        self.fts_query == MATCH_ALL
    }
}

/// A leaf the full-text engine evaluates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FullTextLeaf {
    pub column: Option<&'static str>,
    pub text: String,
}

/// Classify a node as a full-text leaf.
///
/// Free-text searches (unscoped or scoped to a full-text column), `Equal` and
/// `Contains` on a full-text column, and bare string/number literals qualify.
/// Everything else is left to the record predicate.
pub(crate) fn full_text_leaf(node: &QueryNode) -> Option<FullTextLeaf> {
    match node {
        QueryNode::TextSearch(search) => {
            let column = match &search.field {
                None => None,
                Some(field) => Some(RecordField::resolve(field).ok()?.fts_column()?),
            };
            Some(FullTextLeaf {
                column,
                text: search.search_text.clone(),
            })
        }
        QueryNode::Comparison(cmp) => {
            if !matches!(
                cmp.operator,
                ComparisonOperator::Equal | ComparisonOperator::Contains
            ) {
                return None;
            }
            let column = RecordField::resolve(&cmp.field).ok()?.fts_column()?;
            if matches!(cmp.value.value, QueryValue::List(_)) {
                return None;
            }
            Some(FullTextLeaf {
                column: Some(column),
                text: cmp.value.value.as_text()?,
            })
        }
        QueryNode::Literal(literal) => match &literal.value {
            QueryValue::String(_) | QueryValue::Number(_) => Some(FullTextLeaf {
                column: None,
                text: literal.value.as_text()?,
            }),
            _ => None,
        },
        QueryNode::Logical(_) | QueryNode::Field(_) => None,
    }
}

pub(crate) fn is_full_text_leaf(node: &QueryNode) -> bool {
    full_text_leaf(node).is_some()
}

/// Translates query trees into FTS5 syntax.
#[derive(Debug, Clone, Default)]
pub struct FtsQueryTranslator;

impl FtsQueryTranslator {
    pub fn new() -> Self {
        Self
    }

    pub fn translate(&self, ast: &QueryNode) -> FtsQueryResult {
        let mut not_terms = Vec::new();
        let positive = self.translate_node(ast, &mut not_terms);

        let fts_query = match positive {
            Some(query) if !query.is_empty() => query,
            _ => MATCH_ALL.to_string(),
        };

        debug!(
            fts_query = %fts_query,
            not_terms = not_terms.len(),
            "Translated query"
        );

        FtsQueryResult {
            fts_query,
            not_terms,
        }
    }

    fn translate_node(&self, node: &QueryNode, not_terms: &mut Vec<NotTerm>) -> Option<String> {
        if let QueryNode::Logical(logical) = node {
            return match logical.operator {
                LogicalOperator::And => self.join(&logical.children, " AND ", not_terms),
                LogicalOperator::Or => self.join(&logical.children, " OR ", not_terms),
                LogicalOperator::Not | LogicalOperator::Nor => {
                    for child in &logical.children {
                        collect_not_terms(child, not_terms);
                    }
                    None
                }
            };
        }

        let leaf = full_text_leaf(node)?;
        format_term(leaf.column, &leaf.text)
    }

    fn join(
        &self,
        children: &[QueryNode],
        operator: &str,
        not_terms: &mut Vec<NotTerm>,
    ) -> Option<String> {
        let parts: Vec<String> = children
            .iter()
            .filter_map(|child| self.translate_node(child, not_terms))
            .collect();

        match parts.len() {
            0 => None,
            1 => parts.into_iter().next(),
            _ => Some(format!("({})", parts.join(operator))),
        }
    }
}

/// Collect every full-text leaf under a negation, flattening nested logic.
fn collect_not_terms(node: &QueryNode, not_terms: &mut Vec<NotTerm>) {
    if let QueryNode::Logical(logical) = node {
        for child in &logical.children {
            collect_not_terms(child, not_terms);
        }
        return;
    }

    let Some(leaf) = full_text_leaf(node) else {
        return;
    };
    let term = leaf.text.trim();
    if term.is_empty() {
        return;
    }
    let not_term = NotTerm {
        term: term.to_string(),
        field: leaf.column.map(str::to_string),
    };
    if !not_terms.contains(&not_term) {
        not_terms.push(not_term);
    }
}

/// FTS5 bareword characters.
fn is_bareword_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || !c.is_ascii()
}

fn needs_phrase(term: &str) -> bool {
    term.chars().any(|c| !is_bareword_char(c))
        || RESERVED_KEYWORDS
            .iter()
            .any(|keyword| keyword.eq_ignore_ascii_case(term))
}

fn quote_phrase(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

/// Format one term, scoped to a column or to all full-text columns.
///
/// A quoted phrase never directly follows the column prefix; it is wrapped in
/// parentheses instead (`title:("two words")`).
fn format_term(column: Option<&str>, text: &str) -> Option<String> {
    let term = text.trim();
    if term.is_empty() {
        return None;
    }

    let prefix = match column {
        Some(column) => column.to_string(),
        None => format!("{{{}}}", FTS_FIELDS.join(" ")),
    };

    if needs_phrase(term) {
        Some(format!("{}:({})", prefix, quote_phrase(term)))
    } else {
        Some(format!("{}:{}", prefix, term))
    }
}
