//! Annotation capability: named entities (patient identity, dates, codes) in extracted text.

pub mod rules;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extraction::{ExtractedText, RegionId};

pub use rules::{RuleAnnotator, BUILTIN_MODEL};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotationError {
    /// The NLP model could not be loaded. Fatal configuration problem.
    #[error("NLP model unavailable: {0}")]
    ModelUnavailable(String),
}

pub trait Annotator: Send + Sync {
    fn annotate(&self, text: &ExtractedText) -> Result<Vec<CandidateEntity>, AnnotationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Name,
    DateOfBirth,
    InsuranceId,
    Phone,
    Email,
}

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

static DATES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"^\d{1,2}/\d{1,2}/\d{2,4}$").unwrap(),
        Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").unwrap(),
        Regex::new(r"^\d{1,2}-\d{1,2}-\d{2,4}$").unwrap(),
    ]
});

static INSURANCE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]{3,}$").unwrap());

impl EntityKind {
    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "name" => Some(EntityKind::Name),
            "date_of_birth" => Some(EntityKind::DateOfBirth),
            "insurance_id" => Some(EntityKind::InsuranceId),
            "phone" => Some(EntityKind::Phone),
            "email" => Some(EntityKind::Email),
            _ => None,
        }
    }

    /// Whether `value` has the shape expected for this kind of field.
    ///
    /// Phone numbers may carry any punctuation but need 10 or 11 digits.
    pub fn accepts(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            EntityKind::Name => value.chars().any(char::is_alphabetic),
            EntityKind::DateOfBirth => DATES.iter().any(|re| re.is_match(value)),
            EntityKind::InsuranceId => INSURANCE_ID.is_match(value),
            EntityKind::Phone => {
                let digits = value.chars().filter(char::is_ascii_digit).count();
                (10..=11).contains(&digits)
            }
            EntityKind::Email => EMAIL.is_match(value),
        }
    }

    /// Target field the entity fills.
    pub fn field_name(&self) -> &'static str {
        match self {
            EntityKind::Name => "name",
            EntityKind::DateOfBirth => "date_of_birth",
            EntityKind::InsuranceId => "insurance_id",
            EntityKind::Phone => "phone",
            EntityKind::Email => "email",
        }
    }

    pub fn field_names() -> [&'static str; 5] {
        [
            EntityKind::Name.field_name(),
            EntityKind::DateOfBirth.field_name(),
            EntityKind::InsuranceId.field_name(),
            EntityKind::Phone.field_name(),
            EntityKind::Email.field_name(),
        ]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Byte range into the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntity {
    pub kind: EntityKind,
    /// Normalized value.
    pub value: String,
    /// Text as it appeared in the document.
    pub raw: String,
    pub span: Span,
    /// Region the span starts in.
    pub region: Option<RegionId>,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
}
