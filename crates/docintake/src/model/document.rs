use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a document.
///
/// `Pending → Extracting → Annotating → Scoring → {NeedsReview | Completed}`,
/// with `Failed` reachable from every non-terminal state. `NeedsReview` leaves
/// the automated pipeline; a reviewer moves it to `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Extracting,
    Annotating,
    Scoring,
    NeedsReview,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 7] = [
        ProcessingStatus::Pending,
        ProcessingStatus::Extracting,
        ProcessingStatus::Annotating,
        ProcessingStatus::Scoring,
        ProcessingStatus::NeedsReview,
        ProcessingStatus::Completed,
        ProcessingStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Extracting => "extracting",
            ProcessingStatus::Annotating => "annotating",
            ProcessingStatus::Scoring => "scoring",
            ProcessingStatus::NeedsReview => "needs_review",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Terminal for the automated pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::NeedsReview | ProcessingStatus::Completed | ProcessingStatus::Failed
        )
    }

    /// Reached the end of the pipeline without failing.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::NeedsReview | ProcessingStatus::Completed
        )
    }

    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;

        match (self, next) {
            (Pending, Extracting) => true,
            (Extracting, Annotating) => true,
            (Annotating, Scoring) => true,
            (Scoring, Completed) | (Scoring, NeedsReview) => true,
            (Pending | Extracting | Annotating | Scoring, Failed) => true,
            // Reviewer decisions
            (NeedsReview, Completed) | (NeedsReview, Failed) => true,
            // Re-processing re-enters at Pending
            (Failed | NeedsReview | Completed, Pending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown processing status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for ProcessingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessingStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A document registered for intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier (UUID).
    pub id: String,
    /// Original file name.
    pub filename: String,
    /// Location of the uploaded file.
    pub source_path: PathBuf,
    /// MIME type guessed from the file name.
    pub mime_type: Option<String>,
    /// File size in bytes at registration.
    pub file_size: u64,
    /// Batch the document was submitted with.
    pub batch_id: Option<String>,
    pub status: ProcessingStatus,
    /// Error summary of the last failed attempt.
    pub last_error: Option<String>,
    /// Minimum field confidence of the last scored attempt.
    pub overall_confidence: Option<f64>,
    /// Attempt whose field set is currently in force.
    pub current_attempt: Option<String>,
    /// Ingestion timestamp.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }
}

/// Values needed to register a new document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub source_path: PathBuf,
    pub mime_type: Option<String>,
    pub file_size: u64,
    pub batch_id: Option<String>,
}

impl NewDocument {
    /// Builds a registration from a path, guessing the MIME type with `mime_guess`.
    pub fn from_path(source_path: PathBuf, file_size: u64, batch_id: Option<String>) -> Self {
        let filename = source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let mime_type = mime_guess::from_path(&source_path)
            .first()
            .map(|m| m.to_string());

        Self {
            filename,
            source_path,
            mime_type,
            file_size,
            batch_id,
        }
    }

    pub fn into_document(self) -> Document {
        let now = Utc::now();
        Document {
            id: uuid::Uuid::new_v4().to_string(),
            filename: self.filename,
            source_path: self.source_path,
            mime_type: self.mime_type,
            file_size: self.file_size,
            batch_id: self.batch_id,
            status: ProcessingStatus::Pending,
            last_error: None,
            overall_confidence: None,
            current_attempt: None,
            created_at: now,
            updated_at: now,
        }
    }
}
