//! Resolution of query field references to record fields.

use memory_types::ContentRecord;

use crate::ast::FieldNode;
use crate::error::CompileError;

/// Fields indexed by the full-text engine, in column order.
pub const FTS_FIELDS: [&str; 3] = ["title", "description", "content"];

/// A field of [`ContentRecord`] addressable from a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordField {
    Id,
    Title,
    Description,
    Content,
    Tags,
    MimeType,
    CreatedAt,
    /// `metadata` alone addresses the whole map; `metadata.<key>` one entry
    Metadata(Option<String>),
}

impl RecordField {
    /// Resolve a field reference. Top-level names are case-insensitive.
    pub fn resolve(field: &FieldNode) -> Result<Self, CompileError> {
        if field.is_metadata_field {
            return match &field.metadata_key {
                Some(key) if !key.is_empty() => Ok(RecordField::Metadata(Some(key.clone()))),
                _ => Err(CompileError::UnknownField(field.field_path.clone())),
            };
        }

        let path = field.field_path.trim().to_lowercase();
        if let Some((head, rest)) = path.split_once('.') {
            if head == "metadata" && !rest.is_empty() {
                // Keep the caller's spelling of the key
                let key = &field.field_path.trim()[head.len() + 1..];
                return Ok(RecordField::Metadata(Some(key.to_string())));
            }
            return Err(CompileError::NestedFieldNotSupported(
                field.field_path.clone(),
            ));
        }

        match path.as_str() {
            "id" => Ok(RecordField::Id),
            "title" => Ok(RecordField::Title),
            "description" => Ok(RecordField::Description),
            "content" => Ok(RecordField::Content),
            "tags" => Ok(RecordField::Tags),
            "mimetype" => Ok(RecordField::MimeType),
            "createdat" => Ok(RecordField::CreatedAt),
            "metadata" => Ok(RecordField::Metadata(None)),
            _ => Err(CompileError::UnknownField(field.field_path.clone())),
        }
    }

    /// Full-text column name, for fields the engine indexes.
    pub fn fts_column(&self) -> Option<&'static str> {
        match self {
            RecordField::Title => Some(FTS_FIELDS[0]),
            RecordField::Description => Some(FTS_FIELDS[1]),
            RecordField::Content => Some(FTS_FIELDS[2]),
            _ => None,
        }
    }

    /// Scalar string accessor, for fields that have one.
    pub fn string_accessor(&self) -> Option<fn(&ContentRecord) -> Option<&str>> {
        match self {
            RecordField::Id => Some(record_id),
            RecordField::Title => Some(record_title),
            RecordField::Description => Some(record_description),
            RecordField::Content => Some(record_content),
            RecordField::MimeType => Some(record_mime_type),
            _ => None,
        }
    }
}

fn record_id(record: &ContentRecord) -> Option<&str> {
    Some(&record.id)
}

fn record_title(record: &ContentRecord) -> Option<&str> {
    record.title.as_deref()
}

fn record_description(record: &ContentRecord) -> Option<&str> {
    record.description.as_deref()
}

fn record_content(record: &ContentRecord) -> Option<&str> {
    Some(&record.content)
}

fn record_mime_type(record: &ContentRecord) -> Option<&str> {
    Some(&record.mime_type)
}

/// Value of a full-text column on a record.
pub fn fts_field_value<'a>(record: &'a ContentRecord, column: &str) -> Option<&'a str> {
    match column {
        "title" => record.title.as_deref(),
        "description" => record.description.as_deref(),
        "content" => Some(record.content.as_str()),
        _ => None,
    }
}

/// Metadata lookup: exact key first, then case-insensitive.
pub fn metadata_value<'a>(record: &'a ContentRecord, key: &str) -> Option<&'a str> {
    record.metadata.get(key).map(String::as_str).or_else(|| {
        record
            .metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(path: &str) -> Result<RecordField, CompileError> {
        RecordField::resolve(&FieldNode::new(path))
    }

    #[test]
    fn test_top_level_names_case_insensitive() {
        assert_eq!(resolve("Title").unwrap(), RecordField::Title);
        assert_eq!(resolve("MIMETYPE").unwrap(), RecordField::MimeType);
        assert_eq!(resolve("createdAt").unwrap(), RecordField::CreatedAt);
        assert_eq!(resolve("metadata").unwrap(), RecordField::Metadata(None));
    }

    #[test]
    fn test_metadata_paths() {
        assert_eq!(
            resolve("metadata.priority").unwrap(),
            RecordField::Metadata(Some("priority".to_string()))
        );
        assert_eq!(
            resolve("metadata.a.b").unwrap(),
            RecordField::Metadata(Some("a.b".to_string()))
        );
    }

    #[test]
    fn test_rejects_unknown_and_nested() {
        assert!(matches!(resolve("author"), Err(CompileError::UnknownField(_))));
        assert!(matches!(
            resolve("title.length"),
            Err(CompileError::NestedFieldNotSupported(_))
        ));
    }

    #[test]
    fn test_fts_columns() {
        assert_eq!(RecordField::Content.fts_column(), Some("content"));
        assert_eq!(RecordField::Tags.fts_column(), None);
    }

    #[test]
    fn test_metadata_lookup_falls_back_to_case_insensitive() {
        let record = ContentRecord::new("r", "c").with_metadata("Owner", "ana");
        assert_eq!(metadata_value(&record, "Owner"), Some("ana"));
        assert_eq!(metadata_value(&record, "owner"), Some("ana"));
        assert_eq!(metadata_value(&record, "team"), None);
    }
}
