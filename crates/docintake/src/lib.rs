pub mod annotation;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod intake;
pub mod model;
pub mod pipeline;
pub mod review;
pub mod sanitize;
pub mod scoring;
pub mod secrets;
pub mod worker;

pub use annotation::{Annotator, CandidateEntity, EntityKind, RuleAnnotator};
pub use config::{load_config, load_config_or_default, IntakeConfig};
pub use db::{Database, DocumentFilter, DocumentStore};
pub use error::{
    ConfigError, DocIntakeError, RegisterError, Result, ReviewError, WorkerError,
};
pub use extraction::{ExtractedText, Extractor, FormRecognizerClient, RawFile};
pub use intake::{DirectoryIntake, IntakeService, RejectedFile};
pub use model::{
    ConfidenceLevel, Document, ErrorEntry, ErrorKind, ExtractedField, ProcessingLog,
    ProcessingResult, ProcessingStatus,
};
pub use pipeline::{BatchReport, DocumentOutcome, Workflow, WorkflowConfig};
pub use review::{ReviewDetail, ReviewService};
pub use scoring::{ConfidenceScorer, DocumentScore, ScoredField, ScoringWeights};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
