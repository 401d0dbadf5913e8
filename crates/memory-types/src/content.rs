//! Content records as hydrated from a node's content store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default MIME type for records created without one.
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// A stored piece of content. Owned by the content store; read-only for search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    pub content: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    pub created_at: DateTime<Utc>,
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

impl ContentRecord {
    /// Create a plain-text record created now.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            content: content.into(),
            tags: Vec::new(),
            metadata: HashMap::new(),
            mime_type: default_mime_type(),
            created_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
