//! Query parser seam.
//!
//! The grammar lives outside this crate; anything that turns query text into
//! a [`QueryNode`] can be plugged into the orchestrator.

use crate::ast::QueryNode;
use crate::error::QuerySyntaxError;

/// Turns query text into an AST.
pub trait QueryParser: Send + Sync {
    fn parse(&self, query: &str) -> Result<QueryNode, QuerySyntaxError>;
}

impl<F> QueryParser for F
where
    F: Fn(&str) -> Result<QueryNode, QuerySyntaxError> + Send + Sync,
{
    fn parse(&self, query: &str) -> Result<QueryNode, QuerySyntaxError> {
        self(query)
    }
}

/// Treats the whole input as one free-text search over all full-text fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextParser;

impl QueryParser for PlainTextParser {
    fn parse(&self, query: &str) -> Result<QueryNode, QuerySyntaxError> {
        let text = query.trim();
        if text.is_empty() {
            return Err(QuerySyntaxError::new("empty query", 0));
        }
        Ok(QueryNode::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::QueryNode;

    #[test]
    fn test_plain_text_parser() {
        let ast = PlainTextParser.parse("  kubernetes pods ").unwrap();
        assert_eq!(ast, QueryNode::text("kubernetes pods"));

        let err = PlainTextParser.parse("   ").unwrap_err();
        assert_eq!(err.position, 0);
    }

    #[test]
    fn test_closure_parser() {
        let parser = |q: &str| {
            if q.ends_with('(') {
                Err(QuerySyntaxError::new("unbalanced parenthesis", q.len() - 1))
            } else {
                Ok(QueryNode::eq("tags", q))
            }
        };
        assert_eq!(parser.parse("work").unwrap(), QueryNode::eq("tags", "work"));
        assert_eq!(parser.parse("a AND (").unwrap_err().position, 6);
    }
}
