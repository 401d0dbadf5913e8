//! Node-qualified record ids (`node:record`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Separator between node id and record id.
pub const NODE_SEPARATOR: char = ':';

/// A record id addressed within a specific node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedId {
    pub node_id: String,
    pub record_id: String,
}

impl QualifiedId {
    pub fn new(node_id: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            record_id: record_id.into(),
        }
    }

    /// Parse `node:record`. The node part must be a non-empty run of
    /// alphanumerics, `-` or `_`; the record part must be non-empty.
    pub fn parse(s: &str) -> Result<Self, SearchError> {
        let (node, record) = s
            .split_once(NODE_SEPARATOR)
            .ok_or_else(|| invalid_prefix(s))?;

        let valid_node = !node.is_empty()
            && node
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if !valid_node || record.is_empty() {
            return Err(invalid_prefix(s));
        }

        Ok(Self::new(node, record))
    }
}

fn invalid_prefix(value: &str) -> SearchError {
    SearchError::InvalidNodePrefix {
        node_id: None,
        value: value.to_string(),
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.node_id, NODE_SEPARATOR, self.record_id)
    }
}

impl FromStr for QualifiedId {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchErrorKind;

    #[test]
    fn test_parse_and_display() {
        let id = QualifiedId::parse("personal:01HX9Z").unwrap();
        assert_eq!(id.node_id, "personal");
        assert_eq!(id.record_id, "01HX9Z");
        assert_eq!(id.to_string(), "personal:01HX9Z");
    }

    #[test]
    fn test_record_part_may_contain_separator() {
        let id: QualifiedId = "work:doc:part-2".parse().unwrap();
        assert_eq!(id.node_id, "work");
        assert_eq!(id.record_id, "doc:part-2");
    }

    #[test]
    fn test_invalid_prefixes() {
        for bad in ["no-separator", ":record", "we ird:record", "node:"] {
            let err = QualifiedId::parse(bad).unwrap_err();
            assert_eq!(err.kind(), SearchErrorKind::InvalidNodePrefix, "{bad}");
        }
    }
}
