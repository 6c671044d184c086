//! Human review of documents the workflow flagged `NeedsReview`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::annotation::EntityKind;
use crate::db::{DatabaseError, DocumentFilter, DocumentStore, Outcome};
use crate::error::ReviewError;
use crate::model::{ConfidenceLevel, Document, ExtractedField, ProcessingLog, ProcessingStatus};

/// A document with the fields currently in force and its latest log.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewDetail {
    pub document: Document,
    pub fields: Vec<ExtractedField>,
    pub overall_level: Option<ConfidenceLevel>,
    pub last_log: Option<ProcessingLog>,
}

pub struct ReviewService {
    store: Arc<dyn DocumentStore>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Documents awaiting review, oldest first.
    pub fn pending(&self) -> Result<Vec<Document>, ReviewError> {
        Ok(self
            .store
            .list_documents(&DocumentFilter::with_status(ProcessingStatus::NeedsReview))?)
    }

    pub fn detail(&self, id: &str) -> Result<ReviewDetail, ReviewError> {
        let document = self.find(id)?;
        let fields = self.store.list_fields(id)?;
        let last_log = self.store.list_logs(id)?.pop();

        Ok(ReviewDetail {
            overall_level: document.overall_confidence.map(ConfidenceLevel::of),
            document,
            fields,
            last_log,
        })
    }

    /// Accepts the document, applying `corrections` (field name to value).
    ///
    /// Writes a new field set: corrected fields get confidence 1.0, the rest
    /// keep their scores. The previous set stays in the history. Nothing is
    /// written unless every correction is well formed for its field.
    pub fn approve(
        &self,
        id: &str,
        corrections: &BTreeMap<String, String>,
    ) -> Result<Document, ReviewError> {
        let document = self.awaiting_review(id)?;
        let current = self.store.list_fields(id)?;

        let known: BTreeSet<&str> = current
            .iter()
            .map(|f| f.name.as_str())
            .chain(EntityKind::field_names())
            .collect();
        if let Some(unknown) = corrections.keys().find(|name| !known.contains(name.as_str())) {
            return Err(ReviewError::UnknownField(unknown.clone()));
        }
        for (name, value) in corrections {
            let valid = match EntityKind::from_field_name(name) {
                Some(kind) => kind.accepts(value),
                None => !value.trim().is_empty(),
            };
            if !valid {
                return Err(ReviewError::InvalidValue {
                    field: name.clone(),
                    value: value.clone(),
                });
            }
        }

        let attempt_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut fields: BTreeMap<String, ExtractedField> = current
            .into_iter()
            .map(|f| {
                let field = ExtractedField {
                    attempt_id: attempt_id.clone(),
                    created_at: now,
                    ..f
                };
                (field.name.clone(), field)
            })
            .collect();

        for (name, value) in corrections {
            let field = fields
                .entry(name.clone())
                .or_insert_with(|| ExtractedField {
                    document_id: id.to_string(),
                    attempt_id: attempt_id.clone(),
                    name: name.clone(),
                    value: String::new(),
                    confidence: 1.0,
                    region: None,
                    created_at: now,
                });
            field.value = value.trim().to_string();
            field.confidence = 1.0;
        }

        let fields: Vec<ExtractedField> = fields.into_values().collect();
        let overall = fields
            .iter()
            .map(|f| f.confidence)
            .reduce(f64::min);

        let log = ProcessingLog {
            document_id: id.to_string(),
            attempt_id,
            stage: ProcessingStatus::NeedsReview,
            outcome: ProcessingStatus::Completed,
            error_kind: None,
            message: format!("approved with {} correction(s)", corrections.len()),
            overall_confidence: overall,
            duration_ms: 0,
            created_at: now,
        };

        self.decide(
            &document,
            Outcome {
                from: ProcessingStatus::NeedsReview,
                to: ProcessingStatus::Completed,
                fields: Some(fields),
                overall_confidence: overall,
                last_error: None,
                log,
            },
        )?;

        info!("Approved {} ({} corrections)", id, corrections.len());
        self.find(id)
    }

    /// Rejects the document, moving it to `Failed` with `reason` as its last error.
    pub fn reject(&self, id: &str, reason: &str) -> Result<Document, ReviewError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ReviewError::MissingReason);
        }

        let document = self.awaiting_review(id)?;
        let attempt_id = document
            .current_attempt
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let log = ProcessingLog {
            document_id: id.to_string(),
            attempt_id,
            stage: ProcessingStatus::NeedsReview,
            outcome: ProcessingStatus::Failed,
            error_kind: None,
            message: format!("rejected: {}", reason),
            overall_confidence: document.overall_confidence,
            duration_ms: 0,
            created_at: Utc::now(),
        };

        self.decide(
            &document,
            Outcome {
                from: ProcessingStatus::NeedsReview,
                to: ProcessingStatus::Failed,
                fields: None,
                overall_confidence: document.overall_confidence,
                last_error: Some(format!("rejected in review: {}", reason)),
                log,
            },
        )?;

        info!("Rejected {}", id);
        self.find(id)
    }

    /// Removes the document together with its fields and logs.
    pub fn delete(&self, id: &str) -> Result<(), ReviewError> {
        if self.store.delete_document(id)? {
            Ok(())
        } else {
            Err(ReviewError::NotFound(id.to_string()))
        }
    }

    fn find(&self, id: &str) -> Result<Document, ReviewError> {
        self.store
            .get_document(id)?
            .ok_or_else(|| ReviewError::NotFound(id.to_string()))
    }

    fn awaiting_review(&self, id: &str) -> Result<Document, ReviewError> {
        let document = self.find(id)?;
        if document.status != ProcessingStatus::NeedsReview {
            return Err(ReviewError::NotAwaitingReview {
                id: id.to_string(),
                status: document.status,
            });
        }
        Ok(document)
    }

    fn decide(&self, document: &Document, outcome: Outcome) -> Result<(), ReviewError> {
        match self.store.record_outcome(&document.id, &outcome) {
            Ok(()) => Ok(()),
            Err(DatabaseError::StatusConflict { actual, .. }) => {
                Err(ReviewError::NotAwaitingReview {
                    id: document.id.clone(),
                    status: actual,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
