//! Extraction capability: turns a raw image/PDF into text with per-region confidence.

pub mod form_recognizer;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use form_recognizer::FormRecognizerClient;

/// Default maximum upload size (50 MiB).
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;

/// Extensions accepted by default.
pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif", "pdf"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Extraction service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Unexpected extraction failure: {0}")]
    Unexpected(String),
}

pub trait Extractor: Send + Sync {
    fn extract(&self, file: &RawFile) -> Result<ExtractedText, ExtractionError>;
}

/// Limits a file must satisfy before it is sent to a provider.
#[derive(Debug, Clone)]
pub struct ExtractionLimits {
    pub max_file_size_bytes: u64,
    /// Lowercase extensions without the leading dot.
    pub supported_extensions: Vec<String>,
}

impl ExtractionLimits {
    pub fn supports_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.supports_extension(ext))
            .unwrap_or(false)
    }

    pub fn supports_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.supported_extensions.iter().any(|s| *s == ext)
    }
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            supported_extensions: DEFAULT_SUPPORTED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// File contents handed to an extractor.
#[derive(Clone)]
pub struct RawFile {
    pub path: PathBuf,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for RawFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFile")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl RawFile {
    pub fn load(path: &Path) -> Result<Self, ExtractionError> {
        let bytes = std::fs::read(path).map_err(|e| {
            ExtractionError::InvalidInput(format!(
                "failed to read '{}': {}",
                crate::sanitize::redact_path(path),
                e
            ))
        })?;

        Ok(Self::from_bytes(path.to_path_buf(), bytes))
    }

    pub fn from_bytes(path: PathBuf, bytes: Vec<u8>) -> Self {
        let filename = crate::sanitize::redact_path(&path);
        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();
        Self {
            path,
            filename,
            mime_type,
            bytes,
        }
    }

    pub fn validate(&self, limits: &ExtractionLimits) -> Result<(), ExtractionError> {
        if !limits.supports_path(&self.path) {
            let ext = self
                .path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            return Err(ExtractionError::InvalidInput(format!(
                "unsupported file type '{}'",
                ext
            )));
        }

        if self.bytes.is_empty() {
            return Err(ExtractionError::InvalidInput(format!(
                "'{}' is empty",
                self.filename
            )));
        }

        let size = self.bytes.len() as u64;
        if size > limits.max_file_size_bytes {
            return Err(ExtractionError::InvalidInput(format!(
                "'{}' is {} bytes, limit is {}",
                self.filename, size, limits.max_file_size_bytes
            )));
        }

        Ok(())
    }
}

/// Identifier of an extraction region (a page, for the document-analysis provider).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub String);

impl RegionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn page(number: u32) -> Self {
        Self(format!("page-{}", number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A byte range of the extracted text with the provider's confidence for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub id: RegionId,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub regions: Vec<TextRegion>,
}

impl ExtractedText {
    /// Text covered by a single region.
    pub fn single_region(text: impl Into<String>, id: RegionId, confidence: f64) -> Self {
        let text = text.into();
        let end = text.len();
        Self {
            text,
            regions: vec![TextRegion {
                id,
                start: 0,
                end,
                confidence,
            }],
        }
    }

    /// Region containing the given byte offset.
    pub fn region_at(&self, offset: usize) -> Option<&TextRegion> {
        self.regions
            .iter()
            .find(|r| r.start <= offset && offset < r.end)
    }

    pub fn region_confidences(&self) -> BTreeMap<RegionId, f64> {
        self.regions
            .iter()
            .map(|r| (r.id.clone(), r.confidence))
            .collect()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
