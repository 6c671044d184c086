//! Extracted field sets. Rows are inserted once and never updated.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;
use crate::model::ExtractedField;

fn from_row(row: &Row<'_>) -> Result<ExtractedField, rusqlite::Error> {
    Ok(ExtractedField {
        document_id: row.get("document_id")?,
        attempt_id: row.get("attempt_id")?,
        name: row.get("name")?,
        value: row.get("value")?,
        confidence: row.get("confidence")?,
        region: row.get("region")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert_set(conn: &Connection, fields: &[ExtractedField]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO extracted_fields
         (document_id, attempt_id, name, value, confidence, region, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for field in fields {
        stmt.execute(params![
            field.document_id,
            field.attempt_id,
            field.name,
            field.value,
            field.confidence,
            field.region,
            field.created_at,
        ])?;
    }
    Ok(())
}

/// Fields of one attempt, by field name.
pub fn find_by_attempt(
    conn: &Connection,
    document_id: &str,
    attempt_id: &str,
) -> Result<Vec<ExtractedField>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM extracted_fields
         WHERE document_id = ?1 AND attempt_id = ?2
         ORDER BY name ASC",
    )?;
    let fields = stmt
        .query_map(params![document_id, attempt_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(fields)
}

/// Every field ever written for a document, oldest attempt first.
pub fn find_all(conn: &Connection, document_id: &str) -> Result<Vec<ExtractedField>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM extracted_fields WHERE document_id = ?1 ORDER BY id ASC",
    )?;
    let fields = stmt
        .query_map(params![document_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(fields)
}
