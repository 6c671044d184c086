use crate::model::{Document, ProcessingResult};

/// A document queued for the workflow, tagged with its position in the batch.
#[derive(Debug, Clone)]
pub struct Job {
    pub index: usize,
    pub document: Document,
}

impl Job {
    pub fn new(index: usize, document: Document) -> Self {
        Self { index, document }
    }
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub index: usize,
    pub document_id: String,
    pub filename: String,
    pub result: ProcessingResult,
}

impl JobResult {
    pub fn new(job: &Job, result: ProcessingResult) -> Self {
        Self {
            index: job.index,
            document_id: job.document.id.clone(),
            filename: job.document.filename.clone(),
            result,
        }
    }
}
