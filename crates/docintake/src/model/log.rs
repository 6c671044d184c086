use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ErrorKind, ProcessingStatus};

/// Append-only record of one processing attempt (or one review decision).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingLog {
    pub document_id: String,
    pub attempt_id: String,
    /// Last stage the attempt reached.
    pub stage: ProcessingStatus,
    /// Status the document ended in.
    pub outcome: ProcessingStatus,
    pub error_kind: Option<ErrorKind>,
    pub message: String,
    pub overall_confidence: Option<f64>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl ProcessingLog {
    pub fn is_failure(&self) -> bool {
        self.error_kind.is_some()
    }
}
