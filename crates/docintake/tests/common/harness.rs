//! Test harness for isolated workflow runs.
//!
//! The `TestHarness` struct provides:
//! - A temporary input directory for uploaded files
//! - An in-memory database behind the `DocumentStore` capability
//! - Workflow construction from scripted provider doubles

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use docintake::annotation::{AnnotationError, Annotator, CandidateEntity};
use docintake::db::{Database, DatabaseError, DocumentFilter, DocumentStore, Outcome};
use docintake::extraction::{ExtractedText, ExtractionError, ExtractionLimits, Extractor, RawFile};
use docintake::pipeline::{Workflow, WorkflowConfig};
use docintake::{Document, ExtractedField, IntakeService, ProcessingLog, ProcessingStatus};

type ExtractionOutcome = Result<ExtractedText, ExtractionError>;

/// Extractor returning scripted results per file name.
///
/// Each file has a queue of results: every call takes the next one and the
/// last one repeats. Files without a script get the fallback.
pub struct ScriptedExtractor {
    scripts: Mutex<HashMap<String, VecDeque<ExtractionOutcome>>>,
    fallback: ExtractionOutcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new(fallback: ExtractedText) -> Self {
        Self::with_fallback(Ok(fallback))
    }

    pub fn failing(error: ExtractionError) -> Self {
        Self::with_fallback(Err(error))
    }

    fn with_fallback(fallback: ExtractionOutcome) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Queues a result for `filename`.
    pub fn on(self, filename: &str, result: ExtractionOutcome) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(filename.to_string())
            .or_default()
            .push_back(result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Extractor for ScriptedExtractor {
    fn extract(&self, file: &RawFile) -> ExtractionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&file.filename) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => self.fallback.clone(),
        }
    }
}

type AnnotationOutcome = Result<Vec<CandidateEntity>, AnnotationError>;

/// Annotator returning scripted entities keyed by the extracted text.
pub struct ScriptedAnnotator {
    by_text: HashMap<String, AnnotationOutcome>,
    fallback: AnnotationOutcome,
    calls: AtomicUsize,
}

impl ScriptedAnnotator {
    pub fn new(fallback: Vec<CandidateEntity>) -> Self {
        Self {
            by_text: HashMap::new(),
            fallback: Ok(fallback),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            by_text: HashMap::new(),
            fallback: Err(AnnotationError::ModelUnavailable(message.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on(mut self, text: &str, entities: Vec<CandidateEntity>) -> Self {
        self.by_text.insert(text.to_string(), Ok(entities));
        self
    }

    pub fn on_error(mut self, text: &str, message: &str) -> Self {
        self.by_text.insert(
            text.to_string(),
            Err(AnnotationError::ModelUnavailable(message.to_string())),
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Annotator for ScriptedAnnotator {
    fn annotate(&self, text: &ExtractedText) -> AnnotationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.by_text
            .get(&text.text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Store whose next `failing_writes` outcome writes fail as if the database
/// were unavailable. Everything else goes to the wrapped database.
pub struct FlakyStore {
    inner: Arc<Database>,
    failing_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<Database>, failing_writes: usize) -> Self {
        Self {
            inner,
            failing_writes: AtomicUsize::new(failing_writes),
        }
    }

    fn should_fail(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DocumentStore for FlakyStore {
    fn create_document(&self, doc: &Document) -> Result<(), DatabaseError> {
        self.inner.create_document(doc)
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>, DatabaseError> {
        self.inner.get_document(id)
    }

    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, DatabaseError> {
        self.inner.list_documents(filter)
    }

    fn update_status(
        &self,
        id: &str,
        from: ProcessingStatus,
        to: ProcessingStatus,
    ) -> Result<(), DatabaseError> {
        self.inner.update_status(id, from, to)
    }

    fn append_log(&self, log: &ProcessingLog) -> Result<(), DatabaseError> {
        self.inner.append_log(log)
    }

    fn record_outcome(&self, id: &str, outcome: &Outcome) -> Result<(), DatabaseError> {
        if self.should_fail() {
            return Err(DatabaseError::LockPoisoned);
        }
        self.inner.record_outcome(id, outcome)
    }

    fn list_fields(&self, id: &str) -> Result<Vec<ExtractedField>, DatabaseError> {
        self.inner.list_fields(id)
    }

    fn list_field_history(&self, id: &str) -> Result<Vec<ExtractedField>, DatabaseError> {
        self.inner.list_field_history(id)
    }

    fn list_logs(&self, id: &str) -> Result<Vec<ProcessingLog>, DatabaseError> {
        self.inner.list_logs(id)
    }

    fn delete_document(&self, id: &str) -> Result<bool, DatabaseError> {
        self.inner.delete_document(id)
    }
}

/// Isolated environment: scratch directory plus in-memory database.
pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    db: Arc<Database>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");
        let db = Arc::new(Database::open_in_memory().expect("Failed to open database"));

        Self {
            temp_dir,
            input_dir,
            db,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.db.clone()
    }

    /// Write a file to the input directory.
    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    pub fn intake(&self) -> IntakeService {
        IntakeService::new(self.store(), ExtractionLimits::default())
    }

    /// Write a small scan and register it as a pending document.
    pub fn register(&self, filename: &str) -> Document {
        self.register_in_batch(filename, None)
    }

    pub fn register_in_batch(&self, filename: &str, batch_id: Option<&str>) -> Document {
        let path = self.write_input(filename, b"scanned-form-bytes");
        self.intake()
            .register_file(&path, batch_id)
            .expect("Failed to register document")
    }

    pub fn workflow(
        &self,
        config: WorkflowConfig,
        extractor: Arc<dyn Extractor>,
        annotator: Arc<dyn Annotator>,
    ) -> Workflow {
        Workflow::new(Arc::new(config), self.store(), extractor, annotator)
    }

    /// Workflow over a store whose first `failing_writes` outcome writes fail.
    pub fn flaky_workflow(
        &self,
        config: WorkflowConfig,
        failing_writes: usize,
        extractor: Arc<dyn Extractor>,
        annotator: Arc<dyn Annotator>,
    ) -> Workflow {
        let store = Arc::new(FlakyStore::new(self.db.clone(), failing_writes));
        Workflow::new(Arc::new(config), store, extractor, annotator)
    }

    /// Current stored copy of a document.
    pub fn document(&self, id: &str) -> Document {
        self.db
            .get_document(id)
            .expect("Failed to load document")
            .expect("Document missing")
    }
}
