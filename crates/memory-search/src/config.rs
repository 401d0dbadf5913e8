//! Index engine configuration.

use std::path::PathBuf;

use memory_types::SearchIndexSettings;
use serde::{Deserialize, Serialize};

/// Raw BM25 scores are divided by this before exponentiation.
pub const DEFAULT_SCORE_DIVISOR: f64 = 10.0;

/// FTS5 caps snippet context at 64 tokens.
pub const MAX_SNIPPET_TOKENS: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FtsIndexConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
    /// Porter stemming on top of the unicode61 tokenizer
    pub enable_stemming: bool,
    pub score_divisor: f64,
    pub snippet_tokens: usize,
    /// Characters of content returned as the snippet of a match-all scan
    pub preview_length: usize,
    pub ellipsis: String,
}

impl Default for FtsIndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./fts-index.db"),
            enable_stemming: true,
            score_divisor: DEFAULT_SCORE_DIVISOR,
            snippet_tokens: 32,
            preview_length: 200,
            ellipsis: "...".to_string(),
        }
    }
}

impl FtsIndexConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &SearchIndexSettings) -> Self {
        Self::new(&settings.path).with_stemming(settings.enable_stemming)
    }

    pub fn with_stemming(mut self, enable_stemming: bool) -> Self {
        self.enable_stemming = enable_stemming;
        self
    }

    pub fn with_snippet_tokens(mut self, tokens: usize) -> Self {
        self.snippet_tokens = tokens.clamp(1, MAX_SNIPPET_TOKENS);
        self
    }

    pub fn with_preview_length(mut self, chars: usize) -> Self {
        self.preview_length = chars;
        self
    }

    /// FTS5 tokenizer clause for this configuration.
    pub fn tokenizer(&self) -> &'static str {
        if self.enable_stemming {
            "porter unicode61"
        } else {
            "unicode61"
        }
    }
}
