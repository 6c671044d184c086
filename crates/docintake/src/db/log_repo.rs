//! Append-only processing log.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;
use crate::model::ProcessingLog;

fn from_row(row: &Row<'_>) -> Result<ProcessingLog, rusqlite::Error> {
    let duration_ms: i64 = row.get("duration_ms")?;
    Ok(ProcessingLog {
        document_id: row.get("document_id")?,
        attempt_id: row.get("attempt_id")?,
        stage: row.get("stage")?,
        outcome: row.get("outcome")?,
        error_kind: row.get("error_kind")?,
        message: row.get("message")?,
        overall_confidence: row.get("overall_confidence")?,
        duration_ms: duration_ms.max(0) as u64,
        created_at: row.get("created_at")?,
    })
}

pub fn insert(conn: &Connection, log: &ProcessingLog) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO processing_logs
         (document_id, attempt_id, stage, outcome, error_kind, message,
          overall_confidence, duration_ms, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            log.document_id,
            log.attempt_id,
            log.stage,
            log.outcome,
            log.error_kind,
            log.message,
            log.overall_confidence,
            log.duration_ms.min(i64::MAX as u64) as i64,
            log.created_at,
        ],
    )?;
    Ok(())
}

/// Logs of a document in the order they were written.
pub fn find_by_document(
    conn: &Connection,
    document_id: &str,
) -> Result<Vec<ProcessingLog>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM processing_logs WHERE document_id = ?1 ORDER BY id ASC")?;
    let logs = stmt
        .query_map(params![document_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(logs)
}
