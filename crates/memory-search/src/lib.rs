//! # memory-search
//!
//! Full-text index engine for memory search, backed by SQLite FTS5.
//!
//! ## Features
//! - One FTS5 table per index: title, description and content columns
//! - BM25 scores normalized into (0, 1] as `exp(raw / 10)`
//! - Engine-generated content snippets with optional highlight markers
//! - Wildcard `*` scans for queries made only of negations
//! - Configurable Porter stemming

pub mod config;
pub mod error;
pub mod index;
pub mod schema;

pub use config::{FtsIndexConfig, DEFAULT_SCORE_DIVISOR};
pub use error::FtsError;
pub use index::{normalize_score, FtsIndex, FtsMatch, SnippetOptions, WILDCARD};
