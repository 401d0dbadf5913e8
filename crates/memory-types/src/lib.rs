//! # memory-types
//!
//! Shared domain types for federated memory search.
//!
//! This crate defines the data structures exchanged between the search
//! components and their callers:
//! - Content records hydrated from node content stores
//! - Search requests, per-index results, reranked results and responses
//! - The search error taxonomy
//! - Settings: nodes, indexes and search constants
//!
//! ## Usage
//!
//! ```rust
//! use memory_types::SearchRequest;
//!
//! let request = SearchRequest::new("kubernetes").with_limit(10);
//! assert!(request.validate().is_ok());
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod qualified_id;
pub mod search;

pub use config::{
    FailurePolicy, NodeAccess, NodeSettings, SearchIndexSettings, SearchSettings, Settings,
};
pub use content::{ContentRecord, DEFAULT_MIME_TYPE};
pub use error::{SearchError, SearchErrorKind};
pub use qualified_id::{QualifiedId, NODE_SEPARATOR};
pub use search::{
    QueryValidation, RerankingConfig, SearchIndexResult, SearchMetadata, SearchRequest,
    SearchResponse, SearchResult, DEFAULT_DIMINISHING_MULTIPLIERS, DEFAULT_LIMIT,
    DEFAULT_MIN_RELEVANCE,
};
