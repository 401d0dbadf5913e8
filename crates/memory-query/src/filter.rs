//! Post-hydration exclusion of negated full-text terms.

use memory_types::ContentRecord;

use crate::field::{fts_field_value, FTS_FIELDS};
use crate::fts::NotTerm;

/// Excludes records containing any negated term, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ExcludedTermFilter {
    terms: Vec<(String, Option<String>)>,
}

impl ExcludedTermFilter {
    pub fn new(not_terms: &[NotTerm]) -> Self {
        let terms = not_terms
            .iter()
            .filter(|t| !t.term.trim().is_empty())
            .map(|t| (t.term.to_lowercase(), t.field.clone()))
            .collect();
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether the record must be dropped.
    pub fn excludes(&self, record: &ContentRecord) -> bool {
        self.terms.iter().any(|(term, field)| match field {
            Some(column) => contains(fts_field_value(record, column), term),
            None => FTS_FIELDS
                .iter()
                .any(|column| contains(fts_field_value(record, column), term)),
        })
    }
}

fn contains(value: Option<&str>, term: &str) -> bool {
    value.is_some_and(|v| v.to_lowercase().contains(term))
}
