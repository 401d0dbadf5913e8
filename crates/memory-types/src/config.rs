//! Configuration loading for memory search.
//!
//! Layered config: defaults -> default config file -> explicit config file -> env vars.
//! The default config file lives at ~/.config/memory-search/config.{toml,json,yaml}.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::search::{RerankingConfig, DEFAULT_DIMINISHING_MULTIPLIERS};

const APP_NAME: &str = "memory-search";

/// How the orchestrator reacts when a node fails mid-search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First node failure aborts the whole search (default)
    #[default]
    FailFast,
    /// Failed nodes become warnings; the search fails only if every node failed
    Partial,
}

/// Access mode of a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeAccess {
    #[default]
    Full,
    ReadOnly,
    WriteOnly,
}

impl NodeAccess {
    pub fn can_search(&self) -> bool {
        !matches!(self, NodeAccess::WriteOnly)
    }
}

/// Search constants injected into the executor and orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSettings {
    /// Per-node deadline when the request does not set one
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Per-node result cap when the request does not set one
    #[serde(default = "default_max_results_per_node")]
    pub default_max_results_per_node: usize,

    /// Deadline for the whole fan-out
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_max_query_depth")]
    pub max_query_depth: usize,

    #[serde(default = "default_max_query_nodes")]
    pub max_query_nodes: usize,

    #[serde(default = "default_weight")]
    pub default_node_weight: f32,

    #[serde(default = "default_weight")]
    pub default_index_weight: f32,

    #[serde(default = "default_multipliers")]
    pub diminishing_multipliers: Vec<f32>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default = "default_highlight_prefix")]
    pub highlight_prefix: String,

    #[serde(default = "default_highlight_suffix")]
    pub highlight_suffix: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_results_per_node() -> usize {
    1000
}

fn default_query_timeout_secs() -> u64 {
    60
}

fn default_max_query_depth() -> usize {
    32
}

fn default_max_query_nodes() -> usize {
    512
}

fn default_weight() -> f32 {
    1.0
}

fn default_multipliers() -> Vec<f32> {
    DEFAULT_DIMINISHING_MULTIPLIERS.to_vec()
}

fn default_highlight_prefix() -> String {
    "<mark>".to_string()
}

fn default_highlight_suffix() -> String {
    "</mark>".to_string()
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            default_max_results_per_node: default_max_results_per_node(),
            query_timeout_secs: default_query_timeout_secs(),
            max_query_depth: default_max_query_depth(),
            max_query_nodes: default_max_query_nodes(),
            default_node_weight: default_weight(),
            default_index_weight: default_weight(),
            diminishing_multipliers: default_multipliers(),
            failure_policy: FailurePolicy::default(),
            highlight_prefix: default_highlight_prefix(),
            highlight_suffix: default_highlight_suffix(),
        }
    }
}

impl SearchSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_timeout_secs == 0 {
            return Err("default_timeout_secs must be > 0".to_string());
        }
        if self.query_timeout_secs == 0 {
            return Err("query_timeout_secs must be > 0".to_string());
        }
        if self.default_max_results_per_node == 0 {
            return Err("default_max_results_per_node must be > 0".to_string());
        }
        if self.diminishing_multipliers.is_empty() {
            return Err("diminishing_multipliers must not be empty".to_string());
        }
        if self.diminishing_multipliers.iter().any(|m| *m < 0.0) {
            return Err("diminishing_multipliers must be >= 0".to_string());
        }
        if self.default_node_weight < 0.0 || self.default_index_weight < 0.0 {
            return Err("default weights must be >= 0".to_string());
        }
        Ok(())
    }

    /// Reranking weights with defaults only; callers layer node/index weights on top.
    pub fn base_reranking_config(&self) -> RerankingConfig {
        RerankingConfig {
            diminishing_multipliers: self.diminishing_multipliers.clone(),
            default_node_weight: self.default_node_weight,
            default_index_weight: self.default_index_weight,
            ..RerankingConfig::default()
        }
    }
}

/// One full-text index attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchIndexSettings {
    pub id: String,

    /// Path to the index database file
    pub path: PathBuf,

    #[serde(default = "default_enable_stemming")]
    pub enable_stemming: bool,

    /// Required indexes cannot be excluded and fail the node when broken
    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub weight: Option<f32>,
}

fn default_enable_stemming() -> bool {
    true
}

impl SearchIndexSettings {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            enable_stemming: default_enable_stemming(),
            required: false,
            weight: None,
        }
    }

    pub fn with_stemming(mut self, enable_stemming: bool) -> Self {
        self.enable_stemming = enable_stemming;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// A searchable partition of the memory store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSettings {
    pub id: String,

    #[serde(default)]
    pub access: NodeAccess,

    #[serde(default)]
    pub weight: Option<f32>,

    #[serde(default)]
    pub search_indexes: Vec<SearchIndexSettings>,
}

impl NodeSettings {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            access: NodeAccess::default(),
            weight: None,
            search_indexes: Vec::new(),
        }
    }

    pub fn with_access(mut self, access: NodeAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_index(mut self, index: SearchIndexSettings) -> Self {
        self.search_indexes.push(index);
        self
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub search: SearchSettings,

    /// Node id -> node configuration
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeSettings>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            search: SearchSettings::default(),
            nodes: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/memory-search/config.*)
    /// 3. Explicit config file (optional)
    /// 4. Environment variables (MEMORY_*, `__` separates nested keys)
    pub fn load(config_path: Option<&str>) -> Result<Self, SearchError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(config_error)?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // MEMORY_LOG_LEVEL, MEMORY_SEARCH__DEFAULT_TIMEOUT_SECS, ...
        builder = builder.add_source(
            Environment::with_prefix("MEMORY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), SearchError> {
        self.search
            .validate()
            .map_err(SearchError::invalid_configuration)?;

        if self.nodes.is_empty() {
            return Err(SearchError::invalid_configuration(
                "no nodes configured".to_string(),
            ));
        }

        for (key, node) in &self.nodes {
            if key != &node.id {
                return Err(SearchError::invalid_configuration(format!(
                    "node key '{}' does not match node id '{}'",
                    key, node.id
                ))
                .for_node(key.as_str()));
            }
            if node.weight.is_some_and(|w| w < 0.0) {
                return Err(SearchError::invalid_configuration(format!(
                    "node '{}' has a negative weight",
                    node.id
                ))
                .for_node(node.id.as_str()));
            }
            let mut seen = HashSet::new();
            for index in &node.search_indexes {
                if !seen.insert(index.id.as_str()) {
                    return Err(SearchError::invalid_configuration(format!(
                        "node '{}' has duplicate search index '{}'",
                        node.id, index.id
                    ))
                    .for_node(node.id.as_str()));
                }
                if index.weight.is_some_and(|w| w < 0.0) {
                    return Err(SearchError::invalid_configuration(format!(
                        "search index '{}' on node '{}' has a negative weight",
                        index.id, node.id
                    ))
                    .for_node(node.id.as_str()));
                }
            }
        }
        Ok(())
    }

    /// Insert a node keyed by its id.
    pub fn with_node(mut self, node: NodeSettings) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }
}

fn config_error(e: config::ConfigError) -> SearchError {
    SearchError::invalid_configuration(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchErrorKind;
    use std::io::Write;

    fn fts(id: &str) -> SearchIndexSettings {
        SearchIndexSettings {
            id: id.to_string(),
            path: PathBuf::from(format!("/tmp/{id}.db")),
            enable_stemming: true,
            required: false,
            weight: None,
        }
    }

    #[test]
    fn test_default_search_settings() {
        let settings = SearchSettings::default();
        assert_eq!(settings.default_timeout_secs, 30);
        assert_eq!(settings.default_max_results_per_node, 1000);
        assert_eq!(settings.diminishing_multipliers, vec![1.0, 0.5, 0.25, 0.125]);
        assert_eq!(settings.failure_policy, FailurePolicy::FailFast);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_search_settings_validation() {
        let mut settings = SearchSettings::default();
        settings.diminishing_multipliers.clear();
        assert!(settings.validate().is_err());

        let mut settings = SearchSettings::default();
        settings.default_timeout_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_requires_nodes() {
        let err = Settings::default().validate().unwrap_err();
        assert!(matches!(err, SearchError::InvalidConfiguration { .. }));
        assert_eq!(err.node_id(), None);
    }

    #[test]
    fn test_validate_rejects_mismatched_key() {
        let mut settings = Settings::default();
        settings
            .nodes
            .insert("alias".to_string(), NodeSettings::new("real"));
        let err = settings.validate().unwrap_err();
        assert_eq!(err.node_id(), Some("alias"));
    }

    #[test]
    fn test_validate_rejects_duplicate_index() {
        let settings = Settings::default()
            .with_node(NodeSettings::new("work").with_index(fts("a")).with_index(fts("a")));
        let err = settings.validate().unwrap_err();
        assert_eq!(err.kind(), SearchErrorKind::InvalidConfiguration);
        assert_eq!(err.node_id(), Some("work"));
    }

    #[test]
    fn test_node_access() {
        assert!(NodeAccess::Full.can_search());
        assert!(NodeAccess::ReadOnly.can_search());
        assert!(!NodeAccess::WriteOnly.can_search());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "search": {{ "default_timeout_secs": 5, "failure_policy": "partial" }},
                "nodes": {{
                    "personal": {{
                        "id": "personal",
                        "access": "read_only",
                        "search_indexes": [{{ "id": "fts", "path": "/tmp/p.db", "required": true }}]
                    }}
                }}
            }}"#
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.search.default_timeout_secs, 5);
        assert_eq!(settings.search.failure_policy, FailurePolicy::Partial);
        assert_eq!(settings.search.default_max_results_per_node, 1000);

        let node = &settings.nodes["personal"];
        assert_eq!(node.access, NodeAccess::ReadOnly);
        assert!(node.search_indexes[0].required);
        assert!(node.search_indexes[0].enable_stemming);
    }

    #[test]
    fn test_base_reranking_config() {
        let mut settings = SearchSettings::default();
        settings.default_index_weight = 0.7;
        let config = settings.base_reranking_config();
        assert_eq!(config.index_weight("any", "any"), 0.7);
        assert_eq!(config.diminishing_multipliers.len(), 4);
    }
}
