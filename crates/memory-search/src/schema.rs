//! FTS5 schema for content records.
//!
//! One virtual table keyed by an unindexed content id, with title,
//! description and content as separately searchable columns.

use rusqlite::Connection;

use crate::config::FtsIndexConfig;
use crate::error::FtsError;

pub const TABLE_NAME: &str = "content_fts";

/// Column position of `content`, used for snippet extraction.
pub const CONTENT_COLUMN: usize = 3;

pub fn create_table_sql(config: &FtsIndexConfig) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {TABLE_NAME} USING fts5(\
         content_id UNINDEXED, title, description, content, tokenize='{}')",
        config.tokenizer()
    )
}

pub(crate) fn apply_pragmas(conn: &Connection) -> Result<(), FtsError> {
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.execute_batch(
        r"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
        ",
    )?;
    Ok(())
}

pub(crate) fn ensure_schema(conn: &Connection, config: &FtsIndexConfig) -> Result<(), FtsError> {
    conn.execute_batch(&create_table_sql(config))?;
    Ok(())
}
