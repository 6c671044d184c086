pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;
pub mod timeout;

pub use batch::{BatchReport, DocumentOutcome};
pub use config::{RetryPolicy, WorkflowConfig};
pub use context::WorkflowContext;
pub use error::StageFailure;
pub use progress::{BroadcastProgress, DocumentEvent, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::Workflow;
