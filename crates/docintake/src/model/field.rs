use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized field extracted from a document.
///
/// Fields are written once per successful attempt and never edited; a re-run
/// or a review correction produces a new set under a new `attempt_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub document_id: String,
    pub attempt_id: String,
    pub name: String,
    pub value: String,
    /// Combined confidence in `[0, 1]`.
    pub confidence: f64,
    /// Extraction region the value came from.
    pub region: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExtractedField {
    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::of(self.confidence)
    }
}

/// Coarse bucket of a confidence score, for reviewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// `High` from 0.8, `Medium` from 0.5, `Low` below.
    pub fn of(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ConfidenceLevel::High
        } else if confidence >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
