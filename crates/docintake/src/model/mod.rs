//! Domain types shared by the workflow, the persistence layer and the review surface.

pub mod document;
pub mod field;
pub mod log;
pub mod result;

pub use document::{Document, NewDocument, ProcessingStatus, UnknownStatus};
pub use field::{ConfidenceLevel, ExtractedField};
pub use log::ProcessingLog;
pub use result::{ErrorEntry, ErrorKind, ProcessingResult};
