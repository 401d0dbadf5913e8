//! # memory-query
//!
//! Query trees for federated memory search and the two ways they are
//! evaluated: translated into FTS5 match expressions for the index engine,
//! and compiled into in-memory predicates over hydrated records.
//!
//! Negated full-text terms cannot be expressed in the engine query, so the
//! translator returns them separately for [`ExcludedTermFilter`].

pub mod ast;
pub mod error;
pub mod field;
pub mod filter;
pub mod fts;
pub mod parser;
pub mod predicate;

pub use ast::{
    ComparisonNode, ComparisonOperator, FieldNode, LiteralNode, LogicalNode, LogicalOperator,
    QueryNode, QueryValue, TextSearchNode,
};
pub use error::{CompileError, QuerySyntaxError};
pub use field::{RecordField, FTS_FIELDS};
pub use filter::ExcludedTermFilter;
pub use fts::{FtsQueryResult, FtsQueryTranslator, NotTerm, MATCH_ALL, RESERVED_KEYWORDS};
pub use parser::{PlainTextParser, QueryParser};
pub use predicate::{compile, compile_structured, Predicate, PredicateCompiler};
