//! Registration of uploaded files as `Pending` documents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::DocumentStore;
use crate::error::RegisterError;
use crate::extraction::ExtractionLimits;
use crate::model::{Document, NewDocument};
use crate::sanitize;
use crate::worker::DirectoryScanner;

/// A file that was left out of a directory registration.
#[derive(Debug)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub error: RegisterError,
}

/// Result of registering a directory. Rejected files do not stop the
/// remaining files from being registered.
#[derive(Debug)]
pub struct DirectoryIntake {
    pub batch_id: String,
    /// Registered documents, in file name order.
    pub documents: Vec<Document>,
    pub rejected: Vec<RejectedFile>,
}

impl DirectoryIntake {
    /// True when every supported file in the directory was registered.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub struct IntakeService {
    store: Arc<dyn DocumentStore>,
    limits: ExtractionLimits,
}

impl IntakeService {
    pub fn new(store: Arc<dyn DocumentStore>, limits: ExtractionLimits) -> Self {
        Self { store, limits }
    }

    /// Checks format and size, then stores the file as a `Pending` document.
    pub fn register_file(
        &self,
        path: &Path,
        batch_id: Option<&str>,
    ) -> Result<Document, RegisterError> {
        let metadata = std::fs::metadata(path).map_err(|source| RegisterError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(RegisterError::NotAFile(path.to_path_buf()));
        }

        let filename = sanitize::redact_path(path);
        if !self.limits.supports_path(path) {
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            return Err(RegisterError::UnsupportedFormat {
                filename,
                extension,
            });
        }

        let size = metadata.len();
        if size == 0 {
            return Err(RegisterError::Empty(filename));
        }
        if size > self.limits.max_file_size_bytes {
            return Err(RegisterError::TooLarge {
                filename,
                size,
                limit: self.limits.max_file_size_bytes,
            });
        }

        let document =
            NewDocument::from_path(path.to_path_buf(), size, batch_id.map(str::to_string))
                .into_document();
        self.store.create_document(&document)?;

        debug!("Registered {} as {}", filename, document.id);
        Ok(document)
    }

    /// Registers every supported file at the top level of `dir` under one
    /// batch id, generating one when `batch_id` is `None`. Files are
    /// registered in file name order; a file that fails its checks is
    /// reported in `rejected` and the rest are still registered. Only a
    /// failure to scan the directory is an error.
    pub fn register_directory(
        &self,
        dir: &Path,
        batch_id: Option<&str>,
    ) -> Result<DirectoryIntake, RegisterError> {
        let batch_id = batch_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let files = DirectoryScanner::new(dir).scan(&self.limits)?;

        let mut documents = Vec::with_capacity(files.len());
        let mut rejected = Vec::new();
        for path in files {
            match self.register_file(&path, Some(&batch_id)) {
                Ok(document) => documents.push(document),
                Err(error) => {
                    warn!("Skipping {}: {}", sanitize::redact_path(&path), error);
                    rejected.push(RejectedFile { path, error });
                }
            }
        }

        info!(
            dir = %sanitize::hash_path(dir),
            "Registered {} documents in batch {} ({} rejected)",
            documents.len(),
            batch_id,
            rejected.len()
        );
        Ok(DirectoryIntake {
            batch_id,
            documents,
            rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, DocumentFilter};
    use crate::model::ProcessingStatus;
    use std::fs;
    use tempfile::TempDir;

    fn service() -> (Arc<Database>, IntakeService) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store: Arc<dyn DocumentStore> = db.clone();
        (db, IntakeService::new(store, ExtractionLimits::default()))
    }

    #[test]
    fn test_register_file_creates_pending_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("claim.pdf");
        fs::write(&path, b"%PDF-1.4").unwrap();
        let (db, intake) = service();

        let doc = intake.register_file(&path, Some("b1")).unwrap();
        assert_eq!(doc.status, ProcessingStatus::Pending);
        assert_eq!(doc.filename, "claim.pdf");
        assert_eq!(doc.file_size, 8);
        assert_eq!(doc.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(doc.batch_id.as_deref(), Some("b1"));
        let stored = db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Pending);
        assert_eq!(stored.source_path, path);
    }

    #[test]
    fn test_register_rejects_unsupported_and_empty_files() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("notes.txt");
        let empty = dir.path().join("blank.png");
        fs::write(&txt, b"hello").unwrap();
        fs::write(&empty, b"").unwrap();
        let (_db, intake) = service();

        assert!(matches!(
            intake.register_file(&txt, None),
            Err(RegisterError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            intake.register_file(&empty, None),
            Err(RegisterError::Empty(_))
        ));
        assert!(matches!(
            intake.register_file(dir.path(), None),
            Err(RegisterError::NotAFile(_))
        ));
    }

    #[test]
    fn test_register_rejects_oversized_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.png");
        fs::write(&path, vec![0u8; 32]).unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let intake = IntakeService::new(
            db,
            ExtractionLimits {
                max_file_size_bytes: 16,
                ..ExtractionLimits::default()
            },
        );

        assert!(matches!(
            intake.register_file(&path, None),
            Err(RegisterError::TooLarge { size: 32, limit: 16, .. })
        ));
    }

    #[test]
    fn test_register_directory_shares_generated_batch() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.png"), b"x").unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("skip.txt"), b"x").unwrap();
        let (db, intake) = service();

        let registered = intake.register_directory(dir.path(), None).unwrap();
        assert!(registered.is_complete());
        let docs = &registered.documents;
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename, "a.jpg");
        assert_eq!(docs[1].filename, "b.png");

        let stored = db
            .list_documents(&DocumentFilter::with_batch(registered.batch_id.clone()))
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_register_directory_skips_bad_file_and_continues() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.png"), b"scan-a").unwrap();
        fs::write(dir.path().join("b.png"), b"").unwrap();
        fs::write(dir.path().join("c.png"), b"scan-c").unwrap();
        let (db, intake) = service();

        let registered = intake.register_directory(dir.path(), Some("B1")).unwrap();

        assert!(!registered.is_complete());
        let names: Vec<_> = registered
            .documents
            .iter()
            .map(|d| d.filename.as_str())
            .collect();
        assert_eq!(names, vec!["a.png", "c.png"]);
        assert_eq!(registered.rejected.len(), 1);
        assert!(registered.rejected[0].path.ends_with("b.png"));
        assert!(matches!(registered.rejected[0].error, RegisterError::Empty(_)));

        let stored = db
            .list_documents(&DocumentFilter::with_batch("B1"))
            .unwrap();
        assert_eq!(stored.len(), 2);
    }
}
