//! Versioned schema migrations.
//!
//! Applied versions are tracked in `_migrations`; each pending migration
//! runs inside its own transaction together with its bookkeeping row.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_documents_table",
        sql: include_str!("sql/001_create_documents.sql"),
    },
    Migration {
        version: 2,
        description: "create_extracted_fields_table",
        sql: include_str!("sql/002_create_extracted_fields.sql"),
    },
    Migration {
        version: 3,
        description: "create_processing_logs_table",
        sql: include_str!("sql/003_create_processing_logs.sql"),
    },
];

/// Latest schema version known to this build.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

pub fn run_all(conn: &mut Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = current_version(conn)?;
    if current > latest_version() {
        return Err(DatabaseError::Migration {
            version: current,
            reason: format!(
                "database schema is newer than this build (latest known v{})",
                latest_version()
            ),
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let fail = |e: rusqlite::Error| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        };

        let tx = conn.transaction().map_err(fail)?;
        tx.execute_batch(migration.sql).map_err(fail)?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(fail)?;
        tx.commit().map_err(fail)?;
    }

    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        run_all(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = fresh();
        run_all(&mut conn).unwrap();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let mut conn = fresh();
        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (99, 'future')",
            [],
        )
        .unwrap();
        assert!(matches!(
            run_all(&mut conn),
            Err(DatabaseError::Migration { version: 99, .. })
        ));
    }

    #[test]
    fn test_status_check_constraint() {
        let conn = fresh();
        let result = conn.execute(
            "INSERT INTO documents (id, filename, source_path, status, created_at, updated_at)
             VALUES ('d1', 'a.pdf', '/a.pdf', 'processing', '2026-01-01', '2026-01-01')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_fields_cascade_with_document() {
        let conn = fresh();
        conn.execute(
            "INSERT INTO documents (id, filename, source_path, created_at, updated_at)
             VALUES ('d1', 'a.pdf', '/a.pdf', '2026-01-01', '2026-01-01')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO extracted_fields (document_id, attempt_id, name, value, confidence, created_at)
             VALUES ('d1', 'a1', 'name', 'Jane', 0.9, '2026-01-01')",
            [],
        )
        .unwrap();
        conn.execute("DELETE FROM documents WHERE id = 'd1'", []).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM extracted_fields", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
