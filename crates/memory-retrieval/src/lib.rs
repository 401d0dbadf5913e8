//! # memory-retrieval
//!
//! Federated search across memory nodes.
//!
//! ## Core Concepts
//!
//! - **Node**: an independently indexed partition with its own FTS indexes
//!   and content store ([`NodeSearcher`])
//! - **Orchestrator**: selects nodes and indexes, fans the search out in
//!   parallel and merges the answers ([`SearchOrchestrator`])
//! - **Reranker**: weights hits by node and index, and aggregates repeated
//!   hits on the same record with diminishing returns ([`Reranker`])
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use memory_retrieval::{InMemoryContentStore, SearchOrchestrator};
//! use memory_types::{SearchRequest, Settings};
//!
//! let settings = Settings::load(None)?;
//! let orchestrator = SearchOrchestrator::from_settings(&settings, |_| {
//!     Arc::new(InMemoryContentStore::new())
//! })?;
//! let response = orchestrator
//!     .search(&SearchRequest::new("kubernetes").with_limit(10))
//!     .await?;
//! ```

pub mod content;
pub mod node;
pub mod orchestrator;
pub mod rerank;

pub use content::{ContentStore, ContentStoreError, InMemoryContentStore};
pub use node::{
    search_node, IndexDescriptor, MockNodeExecutor, NodeExecutor, NodeIndex, NodeSearchOutcome,
    NodeSearcher, DEFAULT_INDEX_ID,
};
pub use orchestrator::SearchOrchestrator;
pub use rerank::Reranker;
