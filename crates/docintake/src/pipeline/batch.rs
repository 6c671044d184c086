use std::sync::Arc;

use tracing::{info, info_span, warn};

use crate::model::{Document, ErrorEntry, ErrorKind, ProcessingResult};
use crate::worker::{Job, JobResult, WorkerPool};

use super::runner::Workflow;

/// Result for one document of a batch.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub document_id: String,
    pub filename: String,
    pub result: ProcessingResult,
}

/// Per-document outcomes in input order plus the aggregate result.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcomes: Vec<DocumentOutcome>,
    pub result: ProcessingResult,
}

impl BatchReport {
    fn new(outcomes: Vec<DocumentOutcome>) -> Self {
        let result = ProcessingResult::aggregate(outcomes.iter().map(|o| &o.result));
        Self { outcomes, result }
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.success()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }

    /// True when every document ended `Completed` or `NeedsReview`.
    pub fn success(&self) -> bool {
        self.result.success()
    }
}

impl Workflow {
    /// Runs every document through the workflow on a bounded worker pool.
    ///
    /// A failing document never stops the others, and every input document
    /// has an outcome in the report.
    pub fn process_batch(self: &Arc<Self>, documents: Vec<Document>) -> BatchReport {
        let total = documents.len();
        let _batch_span = info_span!("batch", documents = total).entered();

        let mut slots: Vec<Option<JobResult>> = vec![None; total];

        if total > 0 {
            let workers = self.config().max_batch_concurrency.min(total);
            match WorkerPool::new(Arc::clone(self), workers) {
                Ok(pool) => {
                    for (index, document) in documents.iter().enumerate() {
                        if let Err(e) = pool.submit(Job::new(index, document.clone())) {
                            warn!("Could not queue {}: {}", document.id, e);
                            break;
                        }
                    }
                    for job_result in pool.finish() {
                        let index = job_result.index;
                        if let Some(slot) = slots.get_mut(index) {
                            *slot = Some(job_result);
                        }
                    }
                }
                Err(e) => warn!("Could not start worker pool: {}", e),
            }
        }

        let outcomes: Vec<DocumentOutcome> = documents
            .into_iter()
            .zip(slots)
            .map(|(document, slot)| match slot {
                Some(job_result) => DocumentOutcome {
                    document_id: job_result.document_id,
                    filename: job_result.filename,
                    result: job_result.result,
                },
                None => missing(document),
            })
            .collect();

        let report = BatchReport::new(outcomes);
        info!(
            "Batch finished: {} attempted, {} succeeded, {} failed",
            report.attempted(),
            report.succeeded(),
            report.failed()
        );
        report
    }
}

fn missing(document: Document) -> DocumentOutcome {
    let result = ProcessingResult::failure(
        None,
        ErrorEntry {
            document_id: Some(document.id.clone()),
            filename: Some(document.filename.clone()),
            stage: document.status,
            kind: ErrorKind::UnexpectedError,
            message: "worker produced no result".to_string(),
        },
    );
    DocumentOutcome {
        document_id: document.id,
        filename: document.filename,
        result,
    }
}
