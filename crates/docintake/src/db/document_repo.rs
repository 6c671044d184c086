//! Document repository: rows of the `documents` table.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::model::{Document, ProcessingStatus};

const COLUMNS: &str = "id, filename, source_path, mime_type, file_size, batch_id, status,
     last_error, overall_confidence, current_attempt, created_at, updated_at";

/// Query filter for document listing. Results are ordered oldest first.
#[derive(Debug, Default, Clone)]
pub struct DocumentFilter {
    pub status: Option<ProcessingStatus>,
    pub batch_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl DocumentFilter {
    pub fn with_status(status: ProcessingStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_batch(batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: Some(batch_id.into()),
            ..Default::default()
        }
    }
}

fn from_row(row: &Row<'_>) -> Result<Document, rusqlite::Error> {
    let source_path: String = row.get("source_path")?;
    let file_size: i64 = row.get("file_size")?;
    Ok(Document {
        id: row.get("id")?,
        filename: row.get("filename")?,
        source_path: PathBuf::from(source_path),
        mime_type: row.get("mime_type")?,
        file_size: file_size.max(0) as u64,
        batch_id: row.get("batch_id")?,
        status: row.get("status")?,
        last_error: row.get("last_error")?,
        overall_confidence: row.get("overall_confidence")?,
        current_attempt: row.get("current_attempt")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn insert(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            COLUMNS
        ),
        params![
            doc.id,
            doc.filename,
            doc.source_path.to_string_lossy(),
            doc.mime_type,
            doc.file_size as i64,
            doc.batch_id,
            doc.status,
            doc.last_error,
            doc.overall_confidence,
            doc.current_attempt,
            doc.created_at,
            doc.updated_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Document>, DatabaseError> {
    let doc = conn
        .query_row(
            &format!("SELECT {} FROM documents WHERE id = ?1", COLUMNS),
            params![id],
            from_row,
        )
        .optional()?;
    Ok(doc)
}

pub fn query(conn: &Connection, filter: &DocumentFilter) -> Result<Vec<Document>, DatabaseError> {
    let mut conditions = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        values.push(Box::new(status));
        conditions.push(format!("status = ?{}", values.len()));
    }
    if let Some(ref batch_id) = filter.batch_id {
        values.push(Box::new(batch_id.clone()));
        conditions.push(format!("batch_id = ?{}", values.len()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // SQLite treats a negative LIMIT as unbounded.
    values.push(Box::new(filter.limit.map(|l| l as i64).unwrap_or(-1)));
    values.push(Box::new(filter.offset.unwrap_or(0) as i64));
    let sql = format!(
        "SELECT {} FROM documents {} ORDER BY created_at ASC, rowid ASC LIMIT ?{} OFFSET ?{}",
        COLUMNS,
        where_clause,
        values.len() - 1,
        values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let docs = stmt
        .query_map(params_ref.as_slice(), from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(docs)
}

pub fn status_of(conn: &Connection, id: &str) -> Result<ProcessingStatus, DatabaseError> {
    conn.query_row(
        "SELECT status FROM documents WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound(id.to_string()))
}

/// Moves a document from `from` to `to`. Fails with `StatusConflict` when
/// the stored status is not `from`.
pub fn transition(
    conn: &Connection,
    id: &str,
    from: ProcessingStatus,
    to: ProcessingStatus,
    updated_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE documents SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        params![id, from, to, updated_at],
    )?;
    ensure_changed(conn, changed, id, from)
}

/// Terminal write: status plus the scoring summary and field-set pointer.
#[allow(clippy::too_many_arguments)]
pub fn finish(
    conn: &Connection,
    id: &str,
    from: ProcessingStatus,
    to: ProcessingStatus,
    last_error: Option<&str>,
    overall_confidence: Option<f64>,
    current_attempt: Option<&str>,
    updated_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE documents
         SET status = ?3, last_error = ?4, overall_confidence = ?5,
             current_attempt = ?6, updated_at = ?7
         WHERE id = ?1 AND status = ?2",
        params![
            id,
            from,
            to,
            last_error,
            overall_confidence,
            current_attempt,
            updated_at
        ],
    )?;
    ensure_changed(conn, changed, id, from)
}

fn ensure_changed(
    conn: &Connection,
    changed: usize,
    id: &str,
    expected: ProcessingStatus,
) -> Result<(), DatabaseError> {
    if changed > 0 {
        return Ok(());
    }
    let actual = status_of(conn, id)?;
    Err(DatabaseError::StatusConflict {
        id: id.to_string(),
        expected,
        actual,
    })
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}
