use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn};

use crate::annotation::{Annotator, RuleAnnotator};
use crate::config::IntakeConfig;
use crate::db::{DatabaseError, DocumentFilter, DocumentStore, Outcome};
use crate::extraction::{Extractor, FormRecognizerClient, RawFile};
use crate::model::{
    Document, ErrorEntry, ErrorKind, ExtractedField, ProcessingLog, ProcessingResult,
    ProcessingStatus,
};
use crate::sanitize;
use crate::scoring::ConfidenceScorer;

use super::config::WorkflowConfig;
use super::context::WorkflowContext;
use super::error::StageFailure;
use super::progress::{BroadcastProgress, DocumentEvent, NoopProgress, ProgressEvent, ProgressReporter};
use super::timeout::{call_with_timeout, CallError, CallSlots};

/// Drives documents through extraction, annotation and scoring.
///
/// Only the workflow changes a document's processing status. Every attempt
/// that gets past the `Pending` check ends with exactly one processing log,
/// written in the same transaction as the terminal status.
pub struct Workflow {
    config: Arc<WorkflowConfig>,
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn Extractor>,
    annotator: Arc<dyn Annotator>,
    scorer: ConfidenceScorer,
    /// Shared by every worker: at most `max_batch_concurrency` provider
    /// calls run at once, counting calls abandoned after a timeout.
    call_slots: CallSlots,
    progress_sender: Option<Arc<broadcast::Sender<DocumentEvent>>>,
}

impl Workflow {
    pub fn new(
        config: Arc<WorkflowConfig>,
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn Extractor>,
        annotator: Arc<dyn Annotator>,
    ) -> Self {
        let scorer = ConfidenceScorer::new(config.scoring_weights, config.confidence_threshold);
        let call_slots = CallSlots::new(config.max_batch_concurrency);
        Self {
            config,
            store,
            extractor,
            annotator,
            scorer,
            call_slots,
            progress_sender: None,
        }
    }

    /// Production constructor: Form Recognizer extraction and the configured
    /// pattern model.
    pub fn from_config(
        config: &IntakeConfig,
        store: Arc<dyn DocumentStore>,
    ) -> crate::error::Result<Self> {
        let extractor = FormRecognizerClient::new(config.form_recognizer_settings()?)?;
        let annotator = RuleAnnotator::new(config.nlp_model_name.clone());

        Ok(Self::new(
            Arc::new(WorkflowConfig::from_config(config)),
            store,
            Arc::new(extractor),
            Arc::new(annotator),
        ))
    }

    pub fn with_progress_sender(mut self, sender: Arc<broadcast::Sender<DocumentEvent>>) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Processes one `Pending` document to `Completed`, `NeedsReview` or `Failed`.
    ///
    /// Documents in any other status are refused with `InvalidInput`; nothing
    /// is written for a refused call.
    pub fn process_document(&self, document: &Document) -> ProcessingResult {
        let filename = sanitize::redact_path(&document.source_path);
        let _workflow_span = info_span!("workflow",
            document_id = %document.id,
            filename = %filename,
        )
        .entered();

        if document.status != ProcessingStatus::Pending {
            return refused(
                document,
                document.status,
                format!("document is {}, only pending documents can be processed", document.status),
            );
        }

        match self.store.update_status(
            &document.id,
            ProcessingStatus::Pending,
            ProcessingStatus::Extracting,
        ) {
            Ok(()) => {}
            Err(DatabaseError::StatusConflict { actual, .. }) => {
                return refused(
                    document,
                    actual,
                    format!("document is {}, only pending documents can be processed", actual),
                );
            }
            Err(DatabaseError::NotFound(_)) => {
                return refused(document, document.status, "document is not registered".to_string());
            }
            Err(e) => {
                error!("Could not start processing {}: {}", document.id, e);
                return ProcessingResult::failure(
                    Some(document.status),
                    entry(document, StageFailure::persistence(document.status, e)),
                );
            }
        }

        let progress = self.reporter(document);
        let mut ctx = WorkflowContext::new(document.clone());
        ctx.stage = ProcessingStatus::Extracting;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_stages(&mut ctx, progress.as_ref())
        }));

        let failure = match outcome {
            Ok(Ok(result)) => return result,
            Ok(Err(failure)) => failure,
            Err(payload) => StageFailure::new(
                ctx.stage,
                ErrorKind::UnexpectedError,
                format!("panic: {}", panic_message(payload.as_ref())),
            ),
        };

        self.finish_failed(&ctx, failure, progress.as_ref())
    }

    /// Resets a finished document to `Pending` and processes it again. The new
    /// attempt writes its own field set; earlier sets are kept.
    pub fn reprocess_document(&self, id: &str) -> ProcessingResult {
        let document = match self.store.get_document(id) {
            Ok(Some(doc)) => doc,
            Ok(None) => return unregistered(id),
            Err(e) => {
                return ProcessingResult::failure(
                    None,
                    ErrorEntry {
                        document_id: Some(id.to_string()),
                        filename: None,
                        stage: ProcessingStatus::Pending,
                        kind: ErrorKind::UnexpectedError,
                        message: format!("persistence failure: {}", e),
                    },
                )
            }
        };

        match self.reset(document) {
            Ok(doc) => self.process_document(&doc),
            Err(result) => result,
        }
    }

    /// `process_document`, retrying `ServiceUnavailable` failures with
    /// exponential backoff as configured. Each retry is a new attempt.
    pub fn process_with_retry(&self, document: &Document) -> ProcessingResult {
        let policy = self.config.retry;
        let mut result = self.process_document(document);
        let mut retry = 0;

        while retry < policy.max_retries
            && result.error_kind() == Some(ErrorKind::ServiceUnavailable)
        {
            let delay = policy.backoff(retry);
            retry += 1;
            info!(
                "Retrying {} in {:?} (retry {}/{})",
                document.id, delay, retry, policy.max_retries
            );
            thread::sleep(delay);

            let current = match self.store.get_document(&document.id) {
                Ok(Some(doc)) => doc,
                _ => break,
            };
            result = match self.reset(current) {
                Ok(doc) => self.process_document(&doc),
                Err(refusal) => refusal,
            };
        }

        result
    }

    fn reset(&self, mut document: Document) -> Result<Document, ProcessingResult> {
        if document.status == ProcessingStatus::Pending {
            return Ok(document);
        }
        if !document.status.can_transition_to(ProcessingStatus::Pending) {
            return Err(refused(
                &document,
                document.status,
                format!("document is {}, cannot be re-processed", document.status),
            ));
        }

        match self
            .store
            .update_status(&document.id, document.status, ProcessingStatus::Pending)
        {
            Ok(()) => {
                debug!("Reset {} from {} to pending", document.id, document.status);
                document.status = ProcessingStatus::Pending;
                Ok(document)
            }
            Err(DatabaseError::StatusConflict { actual, .. }) => Err(refused(
                &document,
                actual,
                format!("document changed to {} while resetting", actual),
            )),
            Err(e) => Err(ProcessingResult::failure(
                Some(document.status),
                entry(&document, StageFailure::persistence(document.status, e)),
            )),
        }
    }

    fn run_stages(
        &self,
        ctx: &mut WorkflowContext,
        progress: &dyn ProgressReporter,
    ) -> Result<ProcessingResult, StageFailure> {
        // Stage 1: Extract
        {
            let _step = info_span!("extract").entered();
            progress.report(ProgressEvent::Stage {
                status: ProcessingStatus::Extracting,
                message: "Extracting text...".to_string(),
            });
            self.step_extract(ctx)?;
        }

        self.advance(ctx, ProcessingStatus::Annotating)?;

        // Stage 2: Annotate
        {
            let _step = info_span!("annotate").entered();
            progress.report(ProgressEvent::Stage {
                status: ProcessingStatus::Annotating,
                message: "Annotating entities...".to_string(),
            });
            self.step_annotate(ctx)?;
        }

        self.advance(ctx, ProcessingStatus::Scoring)?;

        // Stage 3: Score and record
        let _step = info_span!("score").entered();
        progress.report(ProgressEvent::Stage {
            status: ProcessingStatus::Scoring,
            message: "Scoring fields...".to_string(),
        });
        self.step_score(ctx)?;
        self.step_record(ctx, progress)
    }

    fn step_extract(&self, ctx: &mut WorkflowContext) -> Result<(), StageFailure> {
        let raw = RawFile::load(&ctx.document.source_path).map_err(StageFailure::extraction)?;
        raw.validate(&self.config.limits)
            .map_err(StageFailure::extraction)?;

        let extractor = Arc::clone(&self.extractor);
        let timeout = self.config.request_timeout;
        let call = move || extractor.extract(&raw);
        let text = match call_with_timeout("extract", &self.call_slots, timeout, call) {
            Ok(result) => result.map_err(StageFailure::extraction)?,
            Err(CallError::TimedOut(t)) => {
                return Err(StageFailure::new(
                    ProcessingStatus::Extracting,
                    ErrorKind::ServiceUnavailable,
                    format!("extraction timed out after {}s", t.as_secs_f64()),
                ))
            }
            Err(CallError::Aborted(msg)) => {
                return Err(StageFailure::new(
                    ProcessingStatus::Extracting,
                    ErrorKind::UnexpectedError,
                    msg,
                ))
            }
        };

        if text.is_blank() {
            return Err(StageFailure::new(
                ProcessingStatus::Extracting,
                ErrorKind::InvalidInput,
                "no text extracted",
            ));
        }

        debug!(
            "Extracted {} chars in {} regions",
            text.text.len(),
            text.regions.len()
        );
        ctx.extracted = Some(Arc::new(text));
        Ok(())
    }

    fn step_annotate(&self, ctx: &mut WorkflowContext) -> Result<(), StageFailure> {
        let text = extracted(ctx, ProcessingStatus::Annotating)?;
        let annotator = Arc::clone(&self.annotator);
        let timeout = self.config.request_timeout;

        let call = move || annotator.annotate(&text);
        let entities = match call_with_timeout("annotate", &self.call_slots, timeout, call) {
            Ok(result) => result.map_err(StageFailure::annotation)?,
            Err(CallError::TimedOut(t)) => {
                return Err(StageFailure::new(
                    ProcessingStatus::Annotating,
                    ErrorKind::ModelUnavailable,
                    format!("annotation timed out after {}s", t.as_secs_f64()),
                ))
            }
            Err(CallError::Aborted(msg)) => {
                return Err(StageFailure::new(
                    ProcessingStatus::Annotating,
                    ErrorKind::UnexpectedError,
                    msg,
                ))
            }
        };

        debug!("Annotated {} candidate entities", entities.len());
        ctx.entities = entities;
        Ok(())
    }

    fn step_score(&self, ctx: &mut WorkflowContext) -> Result<(), StageFailure> {
        let text = extracted(ctx, ProcessingStatus::Scoring)?;
        ctx.fields = self.scorer.score(&ctx.entities, &text.region_confidences());
        ctx.score = Some(self.scorer.assess(&ctx.fields));
        Ok(())
    }

    fn step_record(
        &self,
        ctx: &mut WorkflowContext,
        progress: &dyn ProgressReporter,
    ) -> Result<ProcessingResult, StageFailure> {
        let score = ctx.score.ok_or_else(|| {
            StageFailure::new(
                ProcessingStatus::Scoring,
                ErrorKind::UnexpectedError,
                "scoring produced no result",
            )
        })?;
        let status = if score.needs_review {
            ProcessingStatus::NeedsReview
        } else {
            ProcessingStatus::Completed
        };

        let now = Utc::now();
        let fields: Vec<ExtractedField> = ctx
            .fields
            .values()
            .map(|f| ExtractedField {
                document_id: ctx.document.id.clone(),
                attempt_id: ctx.attempt_id.clone(),
                name: f.name.clone(),
                value: f.value.clone(),
                confidence: f.confidence,
                region: f.region.as_ref().map(|r| r.to_string()),
                created_at: now,
            })
            .collect();

        let message = if score.needs_review {
            format!(
                "overall confidence {:.2} below threshold {:.2}",
                score.overall,
                self.scorer.threshold()
            )
        } else {
            format!("{} fields accepted", fields.len())
        };

        let log = ProcessingLog {
            document_id: ctx.document.id.clone(),
            attempt_id: ctx.attempt_id.clone(),
            stage: ProcessingStatus::Scoring,
            outcome: status,
            error_kind: None,
            message,
            overall_confidence: Some(score.overall),
            duration_ms: ctx.elapsed_ms(),
            created_at: now,
        };

        self.store
            .record_outcome(
                &ctx.document.id,
                &Outcome {
                    from: ProcessingStatus::Scoring,
                    to: status,
                    fields: Some(fields.clone()),
                    overall_confidence: Some(score.overall),
                    last_error: None,
                    log,
                },
            )
            .map_err(|e| StageFailure::persistence(ProcessingStatus::Scoring, e))?;
        ctx.stage = status;

        progress.report(ProgressEvent::Scored {
            status,
            overall_confidence: score.overall,
            field_count: fields.len(),
        });
        info!(
            "Document {} is {} (overall confidence {:.2}, {} fields)",
            ctx.document.id,
            status,
            score.overall,
            fields.len()
        );

        Ok(ProcessingResult::scored(
            &ctx.document.id,
            status,
            fields,
            score.overall,
        ))
    }

    fn advance(&self, ctx: &mut WorkflowContext, next: ProcessingStatus) -> Result<(), StageFailure> {
        self.store
            .update_status(&ctx.document.id, ctx.stage, next)
            .map_err(|e| StageFailure::persistence(ctx.stage, e))?;
        ctx.stage = next;
        Ok(())
    }

    fn finish_failed(
        &self,
        ctx: &WorkflowContext,
        failure: StageFailure,
        progress: &dyn ProgressReporter,
    ) -> ProcessingResult {
        warn!("Processing {} failed: {}", ctx.document.id, failure);
        progress.report(ProgressEvent::Failed {
            stage: failure.stage,
            kind: failure.kind,
            error: failure.message.clone(),
        });

        let log = ProcessingLog {
            document_id: ctx.document.id.clone(),
            attempt_id: ctx.attempt_id.clone(),
            stage: failure.stage,
            outcome: ProcessingStatus::Failed,
            error_kind: Some(failure.kind),
            message: failure.message.clone(),
            overall_confidence: None,
            duration_ms: ctx.elapsed_ms(),
            created_at: Utc::now(),
        };

        let outcome = Outcome {
            from: ctx.stage,
            to: ProcessingStatus::Failed,
            fields: None,
            overall_confidence: None,
            last_error: Some(failure.to_string()),
            log,
        };
        let status = match self.store.record_outcome(&ctx.document.id, &outcome) {
            Ok(()) => ProcessingStatus::Failed,
            Err(e) => {
                error!("Could not record failure of {}: {}", ctx.document.id, e);
                self.record_failure_in_steps(&outcome)
            }
        };

        ProcessingResult::failure(Some(status), entry(&ctx.document, failure))
    }

    /// Fallback when the failure transaction cannot be written: the status
    /// change and the log are attempted separately so the document does not
    /// stay in an intermediate stage. Returns the status left in the store.
    fn record_failure_in_steps(&self, outcome: &Outcome) -> ProcessingStatus {
        let id = &outcome.log.document_id;
        let status = match self.store.update_status(id, outcome.from, outcome.to) {
            Ok(()) => outcome.to,
            Err(DatabaseError::StatusConflict { actual, .. }) => actual,
            Err(e) => {
                error!("Could not mark {} as failed: {}", id, e);
                outcome.from
            }
        };
        if let Err(e) = self.store.append_log(&outcome.log) {
            error!("Could not write the processing log of {}: {}", id, e);
        }
        status
    }

    /// Fails documents left in `Extracting`, `Annotating` or `Scoring` whose
    /// last status change is older than `older_than`, e.g. after a crash or a
    /// lost terminal write. Each recovered document gets one log entry and
    /// can then be re-processed. Returns the recovered documents.
    pub fn recover_stale(&self, older_than: Duration) -> Result<Vec<Document>, DatabaseError> {
        let cutoff = match chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            None => return Ok(Vec::new()),
        };
        let mut recovered = Vec::new();

        for stage in [
            ProcessingStatus::Extracting,
            ProcessingStatus::Annotating,
            ProcessingStatus::Scoring,
        ] {
            let stale = self
                .store
                .list_documents(&DocumentFilter::with_status(stage))?
                .into_iter()
                .filter(|doc| doc.updated_at <= cutoff);

            for mut document in stale {
                let message = format!("interrupted during {}", stage);
                let outcome = Outcome {
                    from: stage,
                    to: ProcessingStatus::Failed,
                    fields: None,
                    overall_confidence: None,
                    last_error: Some(message.clone()),
                    log: ProcessingLog {
                        document_id: document.id.clone(),
                        attempt_id: uuid::Uuid::new_v4().to_string(),
                        stage,
                        outcome: ProcessingStatus::Failed,
                        error_kind: Some(ErrorKind::UnexpectedError),
                        message,
                        overall_confidence: None,
                        duration_ms: 0,
                        created_at: Utc::now(),
                    },
                };

                match self.store.record_outcome(&document.id, &outcome) {
                    Ok(()) => {
                        warn!("Recovered {} left in {}", document.id, stage);
                        document.status = ProcessingStatus::Failed;
                        document.last_error = outcome.last_error;
                        document.current_attempt = None;
                        recovered.push(document);
                    }
                    // Picked up again in the meantime
                    Err(DatabaseError::StatusConflict { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(recovered)
    }

    fn reporter(&self, document: &Document) -> Box<dyn ProgressReporter> {
        match self.progress_sender {
            Some(ref sender) => Box::new(BroadcastProgress::new(
                &document.id,
                &document.filename,
                Arc::clone(sender),
            )),
            None => Box::new(NoopProgress),
        }
    }
}

fn extracted(
    ctx: &WorkflowContext,
    stage: ProcessingStatus,
) -> Result<Arc<crate::extraction::ExtractedText>, StageFailure> {
    ctx.extracted.clone().ok_or_else(|| {
        StageFailure::new(stage, ErrorKind::UnexpectedError, "no extracted text")
    })
}

fn entry(document: &Document, failure: StageFailure) -> ErrorEntry {
    ErrorEntry {
        document_id: Some(document.id.clone()),
        filename: Some(document.filename.clone()),
        stage: failure.stage,
        kind: failure.kind,
        message: failure.message,
    }
}

fn refused(document: &Document, status: ProcessingStatus, message: String) -> ProcessingResult {
    debug!("Refused {}: {}", document.id, message);
    ProcessingResult::failure(
        Some(status),
        ErrorEntry {
            document_id: Some(document.id.clone()),
            filename: Some(document.filename.clone()),
            stage: status,
            kind: ErrorKind::InvalidInput,
            message,
        },
    )
}

fn unregistered(id: &str) -> ProcessingResult {
    ProcessingResult::failure(
        None,
        ErrorEntry {
            document_id: Some(id.to_string()),
            filename: None,
            stage: ProcessingStatus::Pending,
            kind: ErrorKind::InvalidInput,
            message: "document is not registered".to_string(),
        },
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationError, CandidateEntity, EntityKind, Span};
    use crate::db::Database;
    use crate::extraction::{ExtractedText, ExtractionError, RegionId};
    use crate::model::NewDocument;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FixedExtractor(Result<ExtractedText, ExtractionError>);

    impl Extractor for FixedExtractor {
        fn extract(&self, _file: &RawFile) -> Result<ExtractedText, ExtractionError> {
            self.0.clone()
        }
    }

    struct SlowExtractor(Duration);

    impl Extractor for SlowExtractor {
        fn extract(&self, _file: &RawFile) -> Result<ExtractedText, ExtractionError> {
            thread::sleep(self.0);
            Ok(ExtractedText::single_region("late", RegionId::page(1), 1.0))
        }
    }

    struct FixedAnnotator(Vec<CandidateEntity>);

    impl Annotator for FixedAnnotator {
        fn annotate(&self, _text: &ExtractedText) -> Result<Vec<CandidateEntity>, AnnotationError> {
            Ok(self.0.clone())
        }
    }

    struct PanickingAnnotator;

    impl Annotator for PanickingAnnotator {
        fn annotate(&self, _text: &ExtractedText) -> Result<Vec<CandidateEntity>, AnnotationError> {
            panic!("annotator bug")
        }
    }

    fn name_entity(conf: f64) -> CandidateEntity {
        CandidateEntity {
            kind: EntityKind::Name,
            value: "Jane Doe".to_string(),
            raw: "Jane Doe".to_string(),
            span: Span::new(0, 8),
            region: Some(RegionId::page(1)),
            confidence: conf,
        }
    }

    fn setup(
        extractor: Arc<dyn Extractor>,
        annotator: Arc<dyn Annotator>,
        timeout: Duration,
    ) -> (TempDir, Arc<Database>, Workflow, Document) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("form.png");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"image-bytes")
            .unwrap();

        let db = Arc::new(Database::open_in_memory().unwrap());
        let doc = NewDocument::from_path(path, 11, None).into_document();
        db.create_document(&doc).unwrap();

        let config = WorkflowConfig {
            request_timeout: timeout,
            ..WorkflowConfig::default()
        };
        let store: Arc<dyn DocumentStore> = db.clone();
        let workflow = Workflow::new(Arc::new(config), store, extractor, annotator);
        (dir, db, workflow, doc)
    }

    fn page_text(conf: f64) -> ExtractedText {
        ExtractedText::single_region("Name: Jane Doe", RegionId::page(1), conf)
    }

    #[test]
    fn test_high_confidence_document_completes() {
        let (_dir, db, workflow, doc) = setup(
            Arc::new(FixedExtractor(Ok(page_text(1.0)))),
            Arc::new(FixedAnnotator(vec![name_entity(0.9)])),
            Duration::from_secs(5),
        );

        let result = workflow.process_document(&doc);
        assert!(result.success());
        assert_eq!(result.status(), Some(ProcessingStatus::Completed));
        assert_eq!(db.list_logs(&doc.id).unwrap().len(), 1);
        assert_eq!(db.list_fields(&doc.id).unwrap().len(), 1);
    }

    #[test]
    fn test_non_pending_document_is_refused_without_log() {
        let (_dir, db, workflow, mut doc) = setup(
            Arc::new(FixedExtractor(Ok(page_text(1.0)))),
            Arc::new(FixedAnnotator(vec![])),
            Duration::from_secs(5),
        );
        doc.status = ProcessingStatus::Completed;

        let result = workflow.process_document(&doc);
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidInput));
        assert_eq!(result.status(), Some(ProcessingStatus::Completed));
        assert!(db.list_logs(&doc.id).unwrap().is_empty());
        assert_eq!(
            db.get_document(&doc.id).unwrap().unwrap().status,
            ProcessingStatus::Pending
        );
    }

    #[test]
    fn test_stale_copy_is_refused() {
        let (_dir, db, workflow, doc) = setup(
            Arc::new(FixedExtractor(Ok(page_text(1.0)))),
            Arc::new(FixedAnnotator(vec![name_entity(0.9)])),
            Duration::from_secs(5),
        );
        assert!(workflow.process_document(&doc).success());

        // Same in-memory copy, still says Pending
        let second = workflow.process_document(&doc);
        assert_eq!(second.error_kind(), Some(ErrorKind::InvalidInput));
        assert_eq!(db.list_logs(&doc.id).unwrap().len(), 1);
    }

    #[test]
    fn test_extraction_timeout_is_service_unavailable() {
        let (_dir, db, workflow, doc) = setup(
            Arc::new(SlowExtractor(Duration::from_millis(500))),
            Arc::new(FixedAnnotator(vec![])),
            Duration::from_millis(20),
        );

        let result = workflow.process_document(&doc);
        assert_eq!(result.error_kind(), Some(ErrorKind::ServiceUnavailable));
        assert_eq!(result.status(), Some(ProcessingStatus::Failed));

        let logs = db.list_logs(&doc.id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].stage, ProcessingStatus::Extracting);
    }

    #[test]
    fn test_annotator_panic_is_unexpected_error() {
        let (_dir, db, workflow, doc) = setup(
            Arc::new(FixedExtractor(Ok(page_text(1.0)))),
            Arc::new(PanickingAnnotator),
            Duration::from_secs(5),
        );

        let result = workflow.process_document(&doc);
        assert_eq!(result.error_kind(), Some(ErrorKind::UnexpectedError));

        let stored = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Failed);
        let logs = db.list_logs(&doc.id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].stage, ProcessingStatus::Annotating);
    }

    #[test]
    fn test_blank_text_is_invalid_input() {
        let (_dir, _db, workflow, doc) = setup(
            Arc::new(FixedExtractor(Ok(ExtractedText::single_region(
                "  \n ",
                RegionId::page(1),
                0.9,
            )))),
            Arc::new(FixedAnnotator(vec![])),
            Duration::from_secs(5),
        );

        let result = workflow.process_document(&doc);
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidInput));
    }

    #[test]
    fn test_progress_events_are_published() {
        let (_dir, _db, workflow, doc) = setup(
            Arc::new(FixedExtractor(Ok(page_text(1.0)))),
            Arc::new(FixedAnnotator(vec![name_entity(0.9)])),
            Duration::from_secs(5),
        );
        let (tx, mut rx) = broadcast::channel(16);
        let workflow = workflow.with_progress_sender(Arc::new(tx));

        workflow.process_document(&doc);

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            statuses.push(event.status);
        }
        assert_eq!(
            statuses,
            vec![
                ProcessingStatus::Extracting,
                ProcessingStatus::Annotating,
                ProcessingStatus::Scoring,
                ProcessingStatus::Completed,
            ]
        );
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
