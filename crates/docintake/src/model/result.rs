use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ExtractedField, ProcessingStatus, UnknownStatus};

/// Failure taxonomy shared by every workflow result and failure log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or unsupported file. Not retried.
    InvalidInput,
    /// Transient provider outage. Callers may retry with backoff.
    ServiceUnavailable,
    /// NLP model could not be loaded. Operator must fix configuration.
    ModelUnavailable,
    /// Anything unanticipated, caught at the workflow boundary.
    UnexpectedError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::UnexpectedError => "unexpected_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ServiceUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid_input" => Ok(ErrorKind::InvalidInput),
            "service_unavailable" => Ok(ErrorKind::ServiceUnavailable),
            "model_unavailable" => Ok(ErrorKind::ModelUnavailable),
            "unexpected_error" => Ok(ErrorKind::UnexpectedError),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One failure reported by the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub document_id: Option<String>,
    pub filename: Option<String>,
    /// Stage the document was in when it failed.
    pub stage: ProcessingStatus,
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .filename
            .as_deref()
            .or(self.document_id.as_deref())
            .unwrap_or("<unregistered>");
        write!(
            f,
            "{} [{} during {}]: {}",
            name, self.kind, self.stage, self.message
        )
    }
}

/// Value returned by every workflow call. Never persisted.
///
/// Success is derived from the error list, so `success()` is true exactly
/// when `errors()` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    document_id: Option<String>,
    status: Option<ProcessingStatus>,
    errors: Vec<ErrorEntry>,
    fields: Vec<ExtractedField>,
    overall_confidence: Option<f64>,
}

impl ProcessingResult {
    /// A document that reached `Completed` or `NeedsReview`.
    pub fn scored(
        document_id: &str,
        status: ProcessingStatus,
        fields: Vec<ExtractedField>,
        overall_confidence: f64,
    ) -> Self {
        Self {
            document_id: Some(document_id.to_string()),
            status: Some(status),
            errors: Vec::new(),
            fields,
            overall_confidence: Some(overall_confidence),
        }
    }

    /// A single failure. `status` is the state the document was left in, if any.
    pub fn failure(status: Option<ProcessingStatus>, error: ErrorEntry) -> Self {
        Self {
            document_id: error.document_id.clone(),
            status,
            errors: vec![error],
            fields: Vec::new(),
            overall_confidence: None,
        }
    }

    /// Batch-level result: errors and fields concatenated in input order.
    pub fn aggregate<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a ProcessingResult>,
    {
        let mut errors = Vec::new();
        let mut fields = Vec::new();
        for result in results {
            errors.extend(result.errors.iter().cloned());
            fields.extend(result.fields.iter().cloned());
        }

        Self {
            document_id: None,
            status: None,
            errors,
            fields,
            overall_confidence: None,
        }
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn fields(&self) -> &[ExtractedField] {
        &self.fields
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn status(&self) -> Option<ProcessingStatus> {
        self.status
    }

    pub fn overall_confidence(&self) -> Option<f64> {
        self.overall_confidence
    }

    /// Kind of the first error, if the call failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.errors.first().map(|e| e.kind)
    }
}
