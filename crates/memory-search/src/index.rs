//! FTS5 index engine.
//!
//! Owns a single SQLite connection, opened lazily on first use and guarded by
//! a mutex; the mutex also serializes writers.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::FtsIndexConfig;
use crate::error::FtsError;
use crate::schema::{apply_pragmas, ensure_schema, CONTENT_COLUMN, TABLE_NAME};

/// Match-all query; bypasses ranking.
pub const WILDCARD: &str = "*";

/// A single engine hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtsMatch {
    pub content_id: String,
    /// Normalized relevance in (0, 1], higher is better
    pub score: f32,
    pub snippet: String,
}

/// Highlight markers placed around matched tokens in snippets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnippetOptions {
    pub prefix: String,
    pub suffix: String,
}

impl SnippetOptions {
    pub fn highlighted(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }
}

/// Map a raw BM25 score (lower is better, usually negative) into (0, 1].
pub fn normalize_score(raw: f64, divisor: f64) -> f32 {
    (raw / divisor).exp().min(1.0) as f32
}

pub struct FtsIndex {
    config: FtsIndexConfig,
    conn: Mutex<Option<Connection>>,
}

impl FtsIndex {
    /// Create a handle. No I/O happens until the first operation.
    pub fn new(config: FtsIndexConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Create a handle and open the database immediately.
    pub fn open(config: FtsIndexConfig) -> Result<Self, FtsError> {
        let index = Self::new(config);
        index.with_connection(|_| Ok(()))?;
        Ok(index)
    }

    pub fn config(&self) -> &FtsIndexConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn is_open(&self) -> bool {
        self.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// Insert or replace the entry for `id`.
    pub fn index(
        &self,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
        content: &str,
    ) -> Result<(), FtsError> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                &format!("DELETE FROM {TABLE_NAME} WHERE content_id = ?1"),
                params![id],
            )?;
            tx.execute(
                &format!(
                    "INSERT INTO {TABLE_NAME} (content_id, title, description, content) \
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![id, title, description, content],
            )?;
            tx.commit()?;
            debug!(content_id = %id, "Indexed content");
            Ok(())
        })
    }

    /// Remove the entry for `id`. Removing a missing id is not an error.
    pub fn remove(&self, id: &str) -> Result<bool, FtsError> {
        self.with_connection(|conn| {
            let removed = conn.execute(
                &format!("DELETE FROM {TABLE_NAME} WHERE content_id = ?1"),
                params![id],
            )?;
            debug!(content_id = %id, removed, "Removed content");
            Ok(removed > 0)
        })
    }

    pub fn clear(&self) -> Result<(), FtsError> {
        self.with_connection(|conn| {
            conn.execute(&format!("DELETE FROM {TABLE_NAME}"), [])?;
            info!(path = %self.config.path.display(), "Cleared index");
            Ok(())
        })
    }

    pub fn count(&self) -> Result<usize, FtsError> {
        self.with_connection(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE_NAME}"), [], |row| {
                    row.get(0)
                })?;
            Ok(count.max(0) as usize)
        })
    }

    /// Search with plain snippets.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<FtsMatch>, FtsError> {
        self.search_with(query, limit, &SnippetOptions::default())
    }

    /// Search with the given snippet markers.
    ///
    /// The wildcard query `*` returns every row with score 1.0 and a content
    /// preview as its snippet.
    pub fn search_with(
        &self,
        query: &str,
        limit: usize,
        snippet: &SnippetOptions,
    ) -> Result<Vec<FtsMatch>, FtsError> {
        let start = Instant::now();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let query = query.trim();

        let matches = if query == WILDCARD || query.is_empty() {
            self.scan_all(limit)?
        } else {
            self.ranked_search(query, limit, snippet)?
        };

        debug!(
            query = %query,
            results = matches.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "FTS search completed"
        );
        Ok(matches)
    }

    fn ranked_search(
        &self,
        query: &str,
        limit: i64,
        snippet: &SnippetOptions,
    ) -> Result<Vec<FtsMatch>, FtsError> {
        let divisor = self.config.score_divisor;
        let sql = format!(
            "SELECT content_id, bm25({TABLE_NAME}) AS rank, \
             snippet({TABLE_NAME}, {CONTENT_COLUMN}, ?1, ?2, ?3, ?4) \
             FROM {TABLE_NAME} WHERE {TABLE_NAME} MATCH ?5 \
             ORDER BY rank LIMIT ?6"
        );

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![
                    snippet.prefix,
                    snippet.suffix,
                    self.config.ellipsis,
                    self.config.snippet_tokens as i64,
                    query,
                    limit
                ],
                |row| {
                    let raw: f64 = row.get(1)?;
                    Ok(FtsMatch {
                        content_id: row.get(0)?,
                        score: normalize_score(raw, divisor),
                        snippet: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                },
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    fn scan_all(&self, limit: i64) -> Result<Vec<FtsMatch>, FtsError> {
        let preview = self.config.preview_length;
        let sql = format!("SELECT content_id, content FROM {TABLE_NAME} ORDER BY rowid LIMIT ?1");

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit], |row| {
                let content: Option<String> = row.get(1)?;
                Ok(FtsMatch {
                    content_id: row.get(0)?,
                    score: 1.0,
                    snippet: content
                        .map(|c| c.chars().take(preview).collect())
                        .unwrap_or_default(),
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Checkpoint the WAL and release the connection.
    ///
    /// The next operation reopens the database.
    pub fn close(&self) -> Result<(), FtsError> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            checkpoint(&conn)?;
            info!(path = %self.config.path.display(), "Closed index");
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, FtsError> {
        self.conn
            .lock()
            .map_err(|e| FtsError::Locked(e.to_string()))
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, FtsError>,
    ) -> Result<T, FtsError> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(self.open_connection()?);
        }
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(FtsError::Locked("connection unavailable".to_string())),
        }
    }

    fn open_connection(&self) -> Result<Connection, FtsError> {
        let path = &self.config.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        ensure_schema(&conn, &self.config)?;

        info!(
            path = %path.display(),
            tokenizer = self.config.tokenizer(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Opened FTS index"
        );
        Ok(conn)
    }
}

impl Drop for FtsIndex {
    fn drop(&mut self) {
        let conn = match self.conn.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(conn) = conn {
            if let Err(e) = checkpoint(&conn) {
                warn!(path = %self.config.path.display(), error = %e, "WAL checkpoint on drop failed");
            }
        }
    }
}

fn checkpoint(conn: &Connection) -> Result<(), FtsError> {
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
    Ok(())
}
