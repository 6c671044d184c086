//! The persistence capability the workflow and review service depend on.

use chrono::Utc;

use super::{document_repo, field_repo, log_repo, Database, DatabaseError, DocumentFilter};
use crate::model::{Document, ExtractedField, ProcessingLog, ProcessingStatus};

/// A terminal (or review) change, written atomically by `record_outcome`.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Status the document must currently be in.
    pub from: ProcessingStatus,
    pub to: ProcessingStatus,
    /// New field set. `None` clears the pointer to the set in force.
    pub fields: Option<Vec<ExtractedField>>,
    pub overall_confidence: Option<f64>,
    pub last_error: Option<String>,
    pub log: ProcessingLog,
}

pub trait DocumentStore: Send + Sync {
    fn create_document(&self, doc: &Document) -> Result<(), DatabaseError>;

    fn get_document(&self, id: &str) -> Result<Option<Document>, DatabaseError>;

    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, DatabaseError>;

    /// Compare-and-set status change. Fails with `InvalidTransition` when
    /// `from → to` is not a lifecycle edge, and with `StatusConflict` when the
    /// stored status is not `from`.
    fn update_status(
        &self,
        id: &str,
        from: ProcessingStatus,
        to: ProcessingStatus,
    ) -> Result<(), DatabaseError>;

    fn append_log(&self, log: &ProcessingLog) -> Result<(), DatabaseError>;

    /// Writes status, field set and log in one transaction. The status change
    /// is checked like `update_status`.
    fn record_outcome(&self, id: &str, outcome: &Outcome) -> Result<(), DatabaseError>;

    /// The field set currently in force.
    fn list_fields(&self, id: &str) -> Result<Vec<ExtractedField>, DatabaseError>;

    /// Every field set ever written, oldest first.
    fn list_field_history(&self, id: &str) -> Result<Vec<ExtractedField>, DatabaseError>;

    fn list_logs(&self, id: &str) -> Result<Vec<ProcessingLog>, DatabaseError>;

    /// Removes the document with its fields and logs. Returns false if absent.
    fn delete_document(&self, id: &str) -> Result<bool, DatabaseError>;
}

impl DocumentStore for Database {
    fn create_document(&self, doc: &Document) -> Result<(), DatabaseError> {
        self.with_conn(|conn| document_repo::insert(conn, doc))
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>, DatabaseError> {
        self.with_conn(|conn| document_repo::find_by_id(conn, id))
    }

    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, DatabaseError> {
        self.with_conn(|conn| document_repo::query(conn, filter))
    }

    fn update_status(
        &self,
        id: &str,
        from: ProcessingStatus,
        to: ProcessingStatus,
    ) -> Result<(), DatabaseError> {
        check_transition(id, from, to)?;
        self.with_conn(|conn| document_repo::transition(conn, id, from, to, Utc::now()))
    }

    fn append_log(&self, log: &ProcessingLog) -> Result<(), DatabaseError> {
        self.with_conn(|conn| log_repo::insert(conn, log))
    }

    fn record_outcome(&self, id: &str, outcome: &Outcome) -> Result<(), DatabaseError> {
        check_transition(id, outcome.from, outcome.to)?;
        self.with_tx(|tx| {
            let current_attempt = outcome.fields.as_ref().map(|_| outcome.log.attempt_id.as_str());

            document_repo::finish(
                tx,
                id,
                outcome.from,
                outcome.to,
                outcome.last_error.as_deref(),
                outcome.overall_confidence,
                current_attempt,
                Utc::now(),
            )?;

            if let Some(ref fields) = outcome.fields {
                field_repo::insert_set(tx, fields)?;
            }
            log_repo::insert(tx, &outcome.log)?;

            log::debug!(
                "Recorded outcome for {}: {} -> {} ({} fields)",
                id,
                outcome.from,
                outcome.to,
                outcome.fields.as_ref().map(|f| f.len()).unwrap_or(0)
            );
            Ok(())
        })
    }

    fn list_fields(&self, id: &str) -> Result<Vec<ExtractedField>, DatabaseError> {
        self.with_conn(|conn| {
            let doc = document_repo::find_by_id(conn, id)?
                .ok_or_else(|| DatabaseError::NotFound(id.to_string()))?;
            match doc.current_attempt {
                Some(attempt) => field_repo::find_by_attempt(conn, id, &attempt),
                None => Ok(Vec::new()),
            }
        })
    }

    fn list_field_history(&self, id: &str) -> Result<Vec<ExtractedField>, DatabaseError> {
        self.with_conn(|conn| field_repo::find_all(conn, id))
    }

    fn list_logs(&self, id: &str) -> Result<Vec<ProcessingLog>, DatabaseError> {
        self.with_conn(|conn| log_repo::find_by_document(conn, id))
    }

    fn delete_document(&self, id: &str) -> Result<bool, DatabaseError> {
        let deleted = self.with_conn(|conn| document_repo::delete(conn, id))?;
        if deleted {
            log::info!("Deleted document {}", id);
        }
        Ok(deleted)
    }
}

fn check_transition(
    id: &str,
    from: ProcessingStatus,
    to: ProcessingStatus,
) -> Result<(), DatabaseError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(DatabaseError::InvalidTransition {
            id: id.to_string(),
            from,
            to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorKind, NewDocument};
    use std::path::PathBuf;

    fn registered(db: &Database) -> Document {
        let doc = NewDocument::from_path(PathBuf::from("/uploads/form.png"), 10, None).into_document();
        db.create_document(&doc).unwrap();
        doc
    }

    fn field(doc: &Document, attempt: &str, name: &str, value: &str) -> ExtractedField {
        ExtractedField {
            document_id: doc.id.clone(),
            attempt_id: attempt.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            confidence: 0.9,
            region: Some("page-1".to_string()),
            created_at: Utc::now(),
        }
    }

    fn log_for(doc: &Document, attempt: &str, outcome: ProcessingStatus) -> ProcessingLog {
        ProcessingLog {
            document_id: doc.id.clone(),
            attempt_id: attempt.to_string(),
            stage: ProcessingStatus::Scoring,
            outcome,
            error_kind: None,
            message: String::new(),
            overall_confidence: Some(0.9),
            duration_ms: 12,
            created_at: Utc::now(),
        }
    }

    fn walk_to_scoring(db: &Database, doc: &Document) {
        use ProcessingStatus::*;
        for (from, to) in [(Pending, Extracting), (Extracting, Annotating), (Annotating, Scoring)] {
            db.update_status(&doc.id, from, to).unwrap();
        }
    }

    fn complete(db: &Database, doc: &Document, attempt: &str, value: &str) {
        walk_to_scoring(db, doc);
        db.record_outcome(
            &doc.id,
            &Outcome {
                from: ProcessingStatus::Scoring,
                to: ProcessingStatus::Completed,
                fields: Some(vec![field(doc, attempt, "name", value)]),
                overall_confidence: Some(0.9),
                last_error: None,
                log: log_for(doc, attempt, ProcessingStatus::Completed),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_record_outcome_writes_everything() {
        let db = Database::open_in_memory().unwrap();
        let doc = registered(&db);
        complete(&db, &doc, "a1", "Jane Doe");

        let stored = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Completed);
        assert_eq!(stored.current_attempt.as_deref(), Some("a1"));
        assert_eq!(stored.overall_confidence, Some(0.9));

        let fields = db.list_fields(&doc.id).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].value, "Jane Doe");
        assert_eq!(db.list_logs(&doc.id).unwrap().len(), 1);
    }

    #[test]
    fn test_record_outcome_is_atomic() {
        let db = Database::open_in_memory().unwrap();
        let doc = registered(&db);

        // Duplicate field names in one set violate the unique constraint.
        let result = db.record_outcome(
            &doc.id,
            &Outcome {
                from: ProcessingStatus::Pending,
                to: ProcessingStatus::Failed,
                fields: Some(vec![
                    field(&doc, "a1", "name", "x"),
                    field(&doc, "a1", "name", "y"),
                ]),
                overall_confidence: None,
                last_error: Some("boom".to_string()),
                log: log_for(&doc, "a1", ProcessingStatus::Failed),
            },
        );
        assert!(result.is_err());

        let stored = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Pending);
        assert!(db.list_field_history(&doc.id).unwrap().is_empty());
        assert!(db.list_logs(&doc.id).unwrap().is_empty());
    }

    #[test]
    fn test_new_attempt_keeps_old_set() {
        let db = Database::open_in_memory().unwrap();
        let doc = registered(&db);
        complete(&db, &doc, "a1", "Jane Doe");

        db.update_status(&doc.id, ProcessingStatus::Completed, ProcessingStatus::Pending)
            .unwrap();
        complete(&db, &doc, "a2", "Jane Q Doe");

        let current = db.list_fields(&doc.id).unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].attempt_id, "a2");

        let history = db.list_field_history(&doc.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value, "Jane Doe");
    }

    #[test]
    fn test_failure_outcome_clears_field_pointer() {
        let db = Database::open_in_memory().unwrap();
        let doc = registered(&db);
        let mut log = log_for(&doc, "a1", ProcessingStatus::Failed);
        log.error_kind = Some(ErrorKind::ServiceUnavailable);

        db.record_outcome(
            &doc.id,
            &Outcome {
                from: ProcessingStatus::Pending,
                to: ProcessingStatus::Failed,
                fields: None,
                overall_confidence: None,
                last_error: Some("provider down".to_string()),
                log,
            },
        )
        .unwrap();

        let stored = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("provider down"));
        assert!(db.list_fields(&doc.id).unwrap().is_empty());

        let logs = db.list_logs(&doc.id).unwrap();
        assert_eq!(logs[0].error_kind, Some(ErrorKind::ServiceUnavailable));
    }

    #[test]
    fn test_delete_cascades() {
        let db = Database::open_in_memory().unwrap();
        let doc = registered(&db);
        complete(&db, &doc, "a1", "Jane Doe");

        assert!(db.delete_document(&doc.id).unwrap());
        assert!(db.get_document(&doc.id).unwrap().is_none());
        assert!(db.list_field_history(&doc.id).unwrap().is_empty());
        assert!(db.list_logs(&doc.id).unwrap().is_empty());
    }

    #[test]
    fn test_illegal_status_edges_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        let doc = registered(&db);

        let skipped = db.update_status(&doc.id, ProcessingStatus::Pending, ProcessingStatus::Completed);
        assert!(matches!(skipped, Err(DatabaseError::InvalidTransition { .. })));

        let outcome = db.record_outcome(
            &doc.id,
            &Outcome {
                from: ProcessingStatus::Pending,
                to: ProcessingStatus::NeedsReview,
                fields: Some(vec![field(&doc, "a1", "name", "Jane Doe")]),
                overall_confidence: Some(0.9),
                last_error: None,
                log: log_for(&doc, "a1", ProcessingStatus::NeedsReview),
            },
        );
        assert!(matches!(outcome, Err(DatabaseError::InvalidTransition { .. })));

        let stored = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Pending);
        assert!(db.list_logs(&doc.id).unwrap().is_empty());
        assert!(db.list_field_history(&doc.id).unwrap().is_empty());
    }

    #[test]
    fn test_append_log_requires_document() {
        let db = Database::open_in_memory().unwrap();
        let doc = NewDocument::from_path(PathBuf::from("/x.pdf"), 1, None).into_document();
        assert!(db
            .append_log(&log_for(&doc, "a1", ProcessingStatus::Failed))
            .is_err());
    }
}
