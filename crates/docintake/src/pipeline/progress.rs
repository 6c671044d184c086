use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{ErrorKind, ProcessingStatus};

/// Events emitted by the workflow while a document moves through its stages.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage {
        status: ProcessingStatus,
        message: String,
    },
    Scored {
        status: ProcessingStatus,
        overall_confidence: f64,
        field_count: usize,
    },
    Failed {
        stage: ProcessingStatus,
        kind: ErrorKind,
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress of one document as published to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEvent {
    pub document_id: String,
    pub filename: String,
    pub status: ProcessingStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Publishes workflow events on a broadcast channel.
pub struct BroadcastProgress {
    document_id: String,
    filename: String,
    sender: Arc<broadcast::Sender<DocumentEvent>>,
}

impl BroadcastProgress {
    pub fn new(
        document_id: &str,
        filename: &str,
        sender: Arc<broadcast::Sender<DocumentEvent>>,
    ) -> Self {
        Self {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            sender,
        }
    }

    fn event(&self, status: ProcessingStatus, message: String) -> DocumentEvent {
        DocumentEvent {
            document_id: self.document_id.clone(),
            filename: self.filename.clone(),
            status,
            message,
            timestamp: Utc::now(),
            overall_confidence: None,
            error_kind: None,
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        let event = match event {
            ProgressEvent::Stage { status, message } => self.event(status, message),
            ProgressEvent::Scored {
                status,
                overall_confidence,
                field_count,
            } => {
                let mut e = self.event(
                    status,
                    format!(
                        "{} fields, overall confidence {:.2}",
                        field_count, overall_confidence
                    ),
                );
                e.overall_confidence = Some(overall_confidence);
                e
            }
            ProgressEvent::Failed { stage, kind, error } => {
                let mut e =
                    self.event(ProcessingStatus::Failed, format!("{} during {}: {}", kind, stage, error));
                e.error_kind = Some(kind);
                e
            }
        };

        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}
