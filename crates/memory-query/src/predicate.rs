//! Compilation of query trees into in-memory record predicates.
//!
//! String comparisons are case-insensitive. Missing optional fields never
//! satisfy a positive comparison, so their negations (`NotEqual`, `NotIn`,
//! `Not`) are satisfied by records that lack the field.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use memory_types::ContentRecord;
use tracing::debug;

use crate::ast::{
    ComparisonNode, ComparisonOperator, FieldNode, LogicalNode, LogicalOperator, QueryNode,
    QueryValue, TextSearchNode,
};
use crate::error::CompileError;
use crate::field::{metadata_value, RecordField};
use crate::fts::is_full_text_leaf;

type Accessor = fn(&ContentRecord) -> Option<&str>;

/// A compiled boolean test over content records.
pub struct Predicate {
    test: Box<dyn Fn(&ContentRecord) -> bool + Send + Sync>,
}

impl Predicate {
    pub fn new<F>(test: F) -> Self
    where
        F: Fn(&ContentRecord) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Box::new(test),
        }
    }

    pub fn constant(value: bool) -> Self {
        Self::new(move |_| value)
    }

    pub fn matches(&self, record: &ContentRecord) -> bool {
        (self.test)(record)
    }

    fn negate(self) -> Self {
        Self::new(move |record| !self.matches(record))
    }

    fn all(predicates: Vec<Predicate>) -> Self {
        Self::new(move |record| predicates.iter().all(|p| p.matches(record)))
    }

    fn any(predicates: Vec<Predicate>) -> Self {
        Self::new(move |record| predicates.iter().any(|p| p.matches(record)))
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").finish_non_exhaustive()
    }
}

/// Compile a query tree into a predicate with full semantics.
pub fn compile(ast: &QueryNode) -> Result<Predicate, CompileError> {
    PredicateCompiler::new().compile(ast)
}

/// Compile only the parts of a query the full-text engine cannot evaluate.
///
/// Full-text leaves are relaxed so they never reject a record the engine
/// already matched: `true` in positive position, `false` under a negation
/// (where the excluded-term filter handles them). Returns `None` when the
/// query has no structured leaves at all.
pub fn compile_structured(ast: &QueryNode) -> Result<Option<Predicate>, CompileError> {
    if !has_structured_leaf(ast) {
        return Ok(None);
    }
    PredicateCompiler::structured().compile(ast).map(Some)
}

fn has_structured_leaf(node: &QueryNode) -> bool {
    match node {
        QueryNode::Logical(logical) => logical.children.iter().any(has_structured_leaf),
        other => !is_full_text_leaf(other),
    }
}

/// Builds predicates from query trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateCompiler {
    relax_full_text: bool,
}

impl PredicateCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A compiler that relaxes full-text leaves, see [`compile_structured`].
    pub fn structured() -> Self {
        Self {
            relax_full_text: true,
        }
    }

    pub fn compile(&self, ast: &QueryNode) -> Result<Predicate, CompileError> {
        self.compile_node(ast, false)
    }

    fn compile_node(&self, node: &QueryNode, negated: bool) -> Result<Predicate, CompileError> {
        if self.relax_full_text && is_full_text_leaf(node) {
            return Ok(Predicate::constant(!negated));
        }

        match node {
            QueryNode::Logical(logical) => self.compile_logical(logical, negated),
            QueryNode::Comparison(cmp) => compile_comparison(cmp),
            QueryNode::TextSearch(search) => compile_text_search(search),
            QueryNode::Field(field) => compile_exists(field, &QueryValue::Null),
            QueryNode::Literal(literal) => match &literal.value {
                QueryValue::Bool(value) => Ok(Predicate::constant(*value)),
                QueryValue::String(_) | QueryValue::Number(_) => {
                    let text = literal.value.as_text().unwrap_or_default();
                    compile_text_search(&TextSearchNode {
                        field: None,
                        search_text: text,
                    })
                }
                other => Err(CompileError::NotACondition(format!("{:?}", other))),
            },
        }
    }

    fn compile_logical(
        &self,
        logical: &LogicalNode,
        negated: bool,
    ) -> Result<Predicate, CompileError> {
        if logical.children.is_empty() {
            return Err(CompileError::EmptyLogicalNode(logical.operator));
        }

        match logical.operator {
            LogicalOperator::And => Ok(Predicate::all(self.compile_children(logical, negated)?)),
            LogicalOperator::Or => Ok(Predicate::any(self.compile_children(logical, negated)?)),
            LogicalOperator::Not => {
                if logical.children.len() > 1 {
                    debug!(
                        ignored = logical.children.len() - 1,
                        "Not node evaluates only its first child"
                    );
                }
                Ok(self.compile_node(&logical.children[0], !negated)?.negate())
            }
            LogicalOperator::Nor => {
                Ok(Predicate::any(self.compile_children(logical, !negated)?).negate())
            }
        }
    }

    fn compile_children(
        &self,
        logical: &LogicalNode,
        negated: bool,
    ) -> Result<Vec<Predicate>, CompileError> {
        logical
            .children
            .iter()
            .map(|child| self.compile_node(child, negated))
            .collect()
    }
}

fn compile_comparison(cmp: &ComparisonNode) -> Result<Predicate, CompileError> {
    if cmp.operator == ComparisonOperator::Exists {
        return compile_exists(&cmp.field, &cmp.value.value);
    }

    let name = cmp.field.field_path.as_str();
    let value = &cmp.value.value;
    match RecordField::resolve(&cmp.field)? {
        RecordField::Tags => compile_tags(name, cmp.operator, value),
        RecordField::CreatedAt => compile_created_at(name, cmp.operator, value),
        RecordField::Metadata(Some(key)) => compile_metadata_key(name, key, cmp.operator, value),
        RecordField::Metadata(None) => compile_metadata_map(name, cmp.operator, value),
        field => match field.string_accessor() {
            Some(get) => compile_string_field(name, get, cmp.operator, value),
            None => Err(CompileError::UnknownField(name.to_string())),
        },
    }
}

/// `Exists` with an optional boolean literal; `false` asks for absence.
fn compile_exists(field: &FieldNode, value: &QueryValue) -> Result<Predicate, CompileError> {
    let want = value.as_bool().unwrap_or(true);
    let present: Predicate = match RecordField::resolve(field)? {
        RecordField::Tags => Predicate::new(|record| !record.tags.is_empty()),
        RecordField::CreatedAt => Predicate::constant(true),
        RecordField::Metadata(Some(key)) => {
            Predicate::new(move |record| metadata_value(record, &key).is_some())
        }
        RecordField::Metadata(None) => Predicate::new(|record| !record.metadata.is_empty()),
        field => match field.string_accessor() {
            Some(get) => Predicate::new(move |record| get(record).is_some()),
            None => return Err(CompileError::UnknownField(field_name(field))),
        },
    };

    Ok(if want { present } else { present.negate() })
}

fn field_name(field: RecordField) -> String {
    format!("{:?}", field).to_lowercase()
}

fn compile_text_search(search: &TextSearchNode) -> Result<Predicate, CompileError> {
    let needle = search.search_text.to_lowercase();

    let Some(field) = &search.field else {
        return Ok(Predicate::new(move |record| {
            contains_ci(record.title.as_deref(), &needle)
                || contains_ci(record.description.as_deref(), &needle)
                || contains_ci(Some(&record.content), &needle)
        }));
    };

    match RecordField::resolve(field)? {
        RecordField::Tags => Ok(Predicate::new(move |record| {
            record.tags.iter().any(|tag| contains_ci(Some(tag), &needle))
        })),
        RecordField::Metadata(Some(key)) => Ok(Predicate::new(move |record| {
            contains_ci(metadata_value(record, &key), &needle)
        })),
        RecordField::Metadata(None) => Ok(Predicate::new(move |record| {
            record
                .metadata
                .values()
                .any(|value| contains_ci(Some(value), &needle))
        })),
        RecordField::CreatedAt => Err(CompileError::UnsupportedOperator {
            field: field.field_path.clone(),
            operator: ComparisonOperator::Contains,
        }),
        other => match other.string_accessor() {
            Some(get) => Ok(Predicate::new(move |record| contains_ci(get(record), &needle))),
            None => Err(CompileError::UnknownField(field.field_path.clone())),
        },
    }
}

fn compile_string_field(
    name: &str,
    get: Accessor,
    operator: ComparisonOperator,
    value: &QueryValue,
) -> Result<Predicate, CompileError> {
    use ComparisonOperator::*;

    let predicate = match operator {
        Equal | NotEqual => {
            let expected = lower_text(name, value)?;
            let equal = Predicate::new(move |record| {
                get(record).is_some_and(|actual| actual.to_lowercase() == expected)
            });
            if operator == NotEqual {
                equal.negate()
            } else {
                equal
            }
        }
        Contains => {
            let needle = lower_text(name, value)?;
            Predicate::new(move |record| contains_ci(get(record), &needle))
        }
        In | NotIn => {
            let list = lower_list(name, value)?;
            let member = Predicate::new(move |record| {
                get(record).is_some_and(|actual| list.contains(&actual.to_lowercase()))
            });
            if operator == NotIn {
                member.negate()
            } else {
                member
            }
        }
        GreaterThan | GreaterThanOrEqual | LessThan | LessThanOrEqual => {
            let bound = lower_text(name, value)?;
            Predicate::new(move |record| {
                get(record).is_some_and(|actual| {
                    ordering_holds(operator, actual.to_lowercase().as_str().cmp(bound.as_str()))
                })
            })
        }
        Exists => return Err(unsupported(name, operator)),
    };

    Ok(predicate)
}

fn compile_tags(
    name: &str,
    operator: ComparisonOperator,
    value: &QueryValue,
) -> Result<Predicate, CompileError> {
    use ComparisonOperator::*;

    match operator {
        Equal | NotEqual => {
            let expected = lower_text(name, value)?;
            let any_equal = Predicate::new(move |record| {
                record
                    .tags
                    .iter()
                    .any(|tag| tag.to_lowercase() == expected)
            });
            Ok(if operator == NotEqual {
                any_equal.negate()
            } else {
                any_equal
            })
        }
        Contains => {
            let needle = lower_text(name, value)?;
            Ok(Predicate::new(move |record| {
                record.tags.iter().any(|tag| contains_ci(Some(tag), &needle))
            }))
        }
        In | NotIn => {
            let list = lower_list(name, value)?;
            let any_member = Predicate::new(move |record| {
                record
                    .tags
                    .iter()
                    .any(|tag| list.contains(&tag.to_lowercase()))
            });
            Ok(if operator == NotIn {
                any_member.negate()
            } else {
                any_member
            })
        }
        _ => Err(unsupported(name, operator)),
    }
}

fn compile_created_at(
    name: &str,
    operator: ComparisonOperator,
    value: &QueryValue,
) -> Result<Predicate, CompileError> {
    use ComparisonOperator::*;

    match operator {
        Equal | NotEqual => {
            let expected = parse_timestamp(name, value)?;
            Ok(Predicate::new(move |record| {
                (record.created_at == expected) == (operator == Equal)
            }))
        }
        In | NotIn => {
            let list = value
                .items()
                .into_iter()
                .map(|item| parse_timestamp(name, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Predicate::new(move |record| {
                list.contains(&record.created_at) == (operator == In)
            }))
        }
        GreaterThan | GreaterThanOrEqual | LessThan | LessThanOrEqual => {
            let bound = parse_timestamp(name, value)?;
            Ok(Predicate::new(move |record| {
                ordering_holds(operator, record.created_at.cmp(&bound))
            }))
        }
        Contains | Exists => Err(unsupported(name, operator)),
    }
}

fn compile_metadata_key(
    name: &str,
    key: String,
    operator: ComparisonOperator,
    value: &QueryValue,
) -> Result<Predicate, CompileError> {
    use ComparisonOperator::*;

    if operator.is_ordering() {
        return match value {
            QueryValue::Number(bound) => {
                let bound = *bound;
                Ok(Predicate::new(move |record| {
                    metadata_value(record, &key)
                        .and_then(|actual| actual.trim().parse::<f64>().ok())
                        .and_then(|actual| actual.partial_cmp(&bound))
                        .is_some_and(|ord| ordering_holds(operator, ord))
                }))
            }
            QueryValue::DateTime(bound) => {
                let bound = *bound;
                Ok(Predicate::new(move |record| {
                    metadata_value(record, &key)
                        .and_then(parse_timestamp_str)
                        .is_some_and(|actual| ordering_holds(operator, actual.cmp(&bound)))
                }))
            }
            _ => {
                let bound = lower_text(name, value)?;
                Ok(Predicate::new(move |record| {
                    metadata_value(record, &key).is_some_and(|actual| {
                        ordering_holds(operator, actual.to_lowercase().as_str().cmp(bound.as_str()))
                    })
                }))
            }
        };
    }

    match operator {
        Equal | NotEqual => {
            let expected = lower_text(name, value)?;
            let equal = Predicate::new(move |record| {
                metadata_value(record, &key).is_some_and(|actual| actual.to_lowercase() == expected)
            });
            Ok(if operator == NotEqual {
                equal.negate()
            } else {
                equal
            })
        }
        Contains => {
            let needle = lower_text(name, value)?;
            Ok(Predicate::new(move |record| {
                contains_ci(metadata_value(record, &key), &needle)
            }))
        }
        In | NotIn => {
            let list = lower_list(name, value)?;
            let member = Predicate::new(move |record| {
                metadata_value(record, &key).is_some_and(|actual| list.contains(&actual.to_lowercase()))
            });
            Ok(if operator == NotIn {
                member.negate()
            } else {
                member
            })
        }
        _ => Err(unsupported(name, operator)),
    }
}

/// Bare `metadata` supports only `Contains` over all values.
fn compile_metadata_map(
    name: &str,
    operator: ComparisonOperator,
    value: &QueryValue,
) -> Result<Predicate, CompileError> {
    match operator {
        ComparisonOperator::Contains => {
            let needle = lower_text(name, value)?;
            Ok(Predicate::new(move |record| {
                record
                    .metadata
                    .values()
                    .any(|value| contains_ci(Some(value), &needle))
            }))
        }
        _ => Err(unsupported(name, operator)),
    }
}

fn unsupported(name: &str, operator: ComparisonOperator) -> CompileError {
    CompileError::UnsupportedOperator {
        field: name.to_string(),
        operator,
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

fn ordering_holds(operator: ComparisonOperator, ord: Ordering) -> bool {
    match operator {
        ComparisonOperator::GreaterThan => ord == Ordering::Greater,
        ComparisonOperator::GreaterThanOrEqual => ord != Ordering::Less,
        ComparisonOperator::LessThan => ord == Ordering::Less,
        ComparisonOperator::LessThanOrEqual => ord != Ordering::Greater,
        _ => false,
    }
}

fn lower_text(name: &str, value: &QueryValue) -> Result<String, CompileError> {
    value
        .as_text()
        .map(|text| text.to_lowercase())
        .ok_or_else(|| CompileError::InvalidValue {
            field: name.to_string(),
            reason: format!("expected a scalar, got {:?}", value),
        })
}

fn lower_list(name: &str, value: &QueryValue) -> Result<Vec<String>, CompileError> {
    value
        .items()
        .into_iter()
        .map(|item| lower_text(name, item))
        .collect()
}

fn parse_timestamp(name: &str, value: &QueryValue) -> Result<DateTime<Utc>, CompileError> {
    let parsed = match value {
        QueryValue::DateTime(ts) => Some(*ts),
        QueryValue::String(s) => parse_timestamp_str(s),
        _ => None,
    };
    parsed.ok_or_else(|| CompileError::InvalidValue {
        field: name.to_string(),
        reason: format!("expected a timestamp, got {:?}", value),
    })
}

/// RFC 3339, or a bare `YYYY-MM-DD` date at midnight UTC.
fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ContentRecord {
        ContentRecord::new("rec-1", "Deploying Kafka on Kubernetes")
            .with_title("Kafka Ops")
            .with_tags(["infra", "Streaming"])
            .with_metadata("Priority", "High")
            .with_metadata("score", "42")
            .with_created_at(Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap())
    }

    fn bare() -> ContentRecord {
        ContentRecord::new("rec-2", "nothing to see")
            .with_created_at(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap())
    }

    fn eval(ast: &QueryNode, record: &ContentRecord) -> bool {
        compile(ast).unwrap().matches(record)
    }

    #[test]
    fn test_text_search_is_case_insensitive() {
        assert!(eval(&QueryNode::text("KAFKA"), &record()));
        assert!(eval(&QueryNode::text("ops"), &record()));
        assert!(!eval(&QueryNode::text("postgres"), &record()));
    }

    #[test]
    fn test_field_scoped_text_search() {
        assert!(eval(&QueryNode::field_text("title", "kafka"), &record()));
        assert!(!eval(&QueryNode::field_text("title", "kubernetes"), &record()));
        assert!(eval(&QueryNode::field_text("tags", "stream"), &record()));
    }

    #[test]
    fn test_equality_on_strings() {
        assert!(eval(&QueryNode::eq("title", "kafka ops"), &record()));
        assert!(eval(&QueryNode::eq("mimetype", "TEXT/PLAIN"), &record()));
        assert!(!eval(&QueryNode::eq("title", "kafka"), &record()));
        // Missing title: Equal false, NotEqual true
        assert!(!eval(&QueryNode::eq("title", "x"), &bare()));
        assert!(eval(&QueryNode::ne("title", "x"), &bare()));
    }

    #[test]
    fn test_not_equal_on_missing_metadata_key() {
        let ast = QueryNode::ne("metadata.priority", "high");
        assert!(eval(&ast, &bare()));
        assert!(!eval(&ast, &record()));
    }

    #[test]
    fn test_metadata_key_lookup_is_case_insensitive() {
        assert!(eval(&QueryNode::eq("metadata.priority", "high"), &record()));
        assert!(eval(&QueryNode::exists("metadata.PRIORITY"), &record()));
        assert!(!eval(&QueryNode::exists("metadata.owner"), &record()));
    }

    #[test]
    fn test_metadata_numeric_ordering() {
        let gt = QueryNode::compare("metadata.score", ComparisonOperator::GreaterThan, 40.0);
        let lt = QueryNode::compare("metadata.score", ComparisonOperator::LessThan, 40.0);
        assert!(eval(&gt, &record()));
        assert!(!eval(&lt, &record()));
        assert!(!eval(&gt, &bare()));
    }

    #[test]
    fn test_in_and_not_in() {
        let tags_in = QueryNode::compare(
            "tags",
            ComparisonOperator::In,
            QueryValue::List(vec!["streaming".into(), "db".into()]),
        );
        assert!(eval(&tags_in, &record()));
        assert!(!eval(&tags_in, &bare()));

        let id_not_in = QueryNode::compare(
            "id",
            ComparisonOperator::NotIn,
            QueryValue::List(vec!["rec-1".into()]),
        );
        assert!(!eval(&id_not_in, &record()));
        assert!(eval(&id_not_in, &bare()));
    }

    #[test]
    fn test_created_at_ordering() {
        let after = QueryNode::compare(
            "createdAt",
            ComparisonOperator::GreaterThanOrEqual,
            "2024-01-01",
        );
        assert!(eval(&after, &record()));
        assert!(!eval(&after, &bare()));

        let before = QueryNode::compare(
            "createdat",
            ComparisonOperator::LessThan,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        assert!(eval(&before, &bare()));
    }

    #[test]
    fn test_exists_and_absence() {
        assert!(eval(&QueryNode::exists("title"), &record()));
        assert!(!eval(&QueryNode::exists("title"), &bare()));
        assert!(!eval(&QueryNode::exists("tags"), &bare()));

        let absent = QueryNode::compare("description", ComparisonOperator::Exists, false);
        assert!(eval(&absent, &record()));
    }

    #[test]
    fn test_logical_operators() {
        let kafka = QueryNode::text("kafka");
        let infra = QueryNode::eq("tags", "infra");
        let postgres = QueryNode::text("postgres");

        assert!(eval(&QueryNode::and(vec![kafka.clone(), infra.clone()]), &record()));
        assert!(!eval(&QueryNode::and(vec![kafka.clone(), postgres.clone()]), &record()));
        assert!(eval(&QueryNode::or(vec![postgres.clone(), infra]), &record()));
        assert!(!eval(&QueryNode::not(kafka.clone()), &record()));
        assert!(eval(&QueryNode::nor(vec![postgres.clone()]), &record()));
        assert!(!eval(&QueryNode::nor(vec![postgres, kafka]), &record()));
    }

    #[test]
    fn test_not_uses_first_child_only() {
        let ast = QueryNode::logical(
            LogicalOperator::Not,
            vec![QueryNode::text("postgres"), QueryNode::text("kafka")],
        );
        assert!(eval(&ast, &record()));
    }

    #[test]
    fn test_bare_literals_and_fields() {
        assert!(eval(&QueryNode::literal(true), &bare()));
        assert!(!eval(&QueryNode::literal(false), &record()));
        assert!(eval(&QueryNode::literal("kubernetes"), &record()));
        assert!(eval(&QueryNode::Field(FieldNode::new("title")), &record()));
        assert!(matches!(
            compile(&QueryNode::literal(QueryValue::Null)),
            Err(CompileError::NotACondition(_))
        ));
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(
            compile(&QueryNode::eq("author", "x")),
            Err(CompileError::UnknownField(_))
        ));
        assert!(matches!(
            compile(&QueryNode::eq("title.sub", "x")),
            Err(CompileError::NestedFieldNotSupported(_))
        ));
        assert!(matches!(
            compile(&QueryNode::and(vec![])),
            Err(CompileError::EmptyLogicalNode(LogicalOperator::And))
        ));
        assert!(matches!(
            compile(&QueryNode::compare("tags", ComparisonOperator::GreaterThan, "a")),
            Err(CompileError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            compile(&QueryNode::eq("createdat", "not a date")),
            Err(CompileError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_structured_returns_none_for_pure_full_text() {
        let ast = QueryNode::and(vec![
            QueryNode::text("kafka"),
            QueryNode::not(QueryNode::field_text("content", "spam")),
        ]);
        assert!(compile_structured(&ast).unwrap().is_none());
    }

    #[test]
    fn test_structured_relaxes_full_text_leaves() {
        // The engine already matched "zookeeper"; only the tag filter applies
        let ast = QueryNode::and(vec![
            QueryNode::text("zookeeper"),
            QueryNode::eq("tags", "infra"),
        ]);
        let predicate = compile_structured(&ast).unwrap().unwrap();
        assert!(predicate.matches(&record()));
        assert!(!predicate.matches(&bare()));
    }

    #[test]
    fn test_structured_relaxes_negated_leaves_to_false() {
        let ast = QueryNode::not(QueryNode::or(vec![
            QueryNode::text("kafka"),
            QueryNode::eq("tags", "infra"),
        ]));
        let predicate = compile_structured(&ast).unwrap().unwrap();
        // Tag condition still excludes; the text leaf is left to the term filter
        assert!(!predicate.matches(&record()));
        assert!(predicate.matches(&bare()));
    }

    #[test]
    fn test_structured_still_reports_bad_fields() {
        let ast = QueryNode::and(vec![QueryNode::text("a"), QueryNode::eq("owner", "b")]);
        assert!(compile_structured(&ast).is_err());
    }
}
