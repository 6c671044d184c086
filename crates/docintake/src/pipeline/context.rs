use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::annotation::CandidateEntity;
use crate::extraction::ExtractedText;
use crate::model::{Document, ProcessingStatus};
use crate::scoring::{DocumentScore, ScoredField};

/// State of one processing attempt, filled in stage by stage.
pub struct WorkflowContext {
    pub document: Document,
    pub attempt_id: String,
    pub started: Instant,

    /// Status last written to the store for this attempt.
    pub stage: ProcessingStatus,

    // Extracting
    pub extracted: Option<Arc<ExtractedText>>,

    // Annotating
    pub entities: Vec<CandidateEntity>,

    // Scoring
    pub fields: BTreeMap<String, ScoredField>,
    pub score: Option<DocumentScore>,
}

impl WorkflowContext {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            attempt_id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
            stage: ProcessingStatus::Pending,
            extracted: None,
            entities: Vec::new(),
            fields: BTreeMap::new(),
            score: None,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis().min(u64::MAX as u128) as u64
    }
}
