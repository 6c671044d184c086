use thiserror::Error;

use crate::annotation::AnnotationError;
use crate::db::DatabaseError;
use crate::extraction::ExtractionError;
use crate::model::{ErrorKind, ProcessingStatus};

/// Why an attempt stopped, and at which stage.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} during {stage}: {message}")]
pub struct StageFailure {
    pub stage: ProcessingStatus,
    pub kind: ErrorKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: ProcessingStatus, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    pub fn extraction(error: ExtractionError) -> Self {
        let kind = match error {
            ExtractionError::InvalidInput(_) => ErrorKind::InvalidInput,
            ExtractionError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            ExtractionError::Unexpected(_) => ErrorKind::UnexpectedError,
        };
        Self::new(ProcessingStatus::Extracting, kind, error.to_string())
    }

    pub fn annotation(error: AnnotationError) -> Self {
        let kind = match error {
            AnnotationError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
        };
        Self::new(ProcessingStatus::Annotating, kind, error.to_string())
    }

    pub fn persistence(stage: ProcessingStatus, error: DatabaseError) -> Self {
        Self::new(
            stage,
            ErrorKind::UnexpectedError,
            format!("persistence failure: {}", error),
        )
    }
}
