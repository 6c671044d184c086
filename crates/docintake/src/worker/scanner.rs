use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::WorkerError;
use crate::extraction::ExtractionLimits;

/// Finds uploadable files at the top level of a directory.
pub struct DirectoryScanner {
    input_directory: PathBuf,
}

impl DirectoryScanner {
    pub fn new<P: AsRef<Path>>(input_directory: P) -> Self {
        Self {
            input_directory: input_directory.as_ref().to_path_buf(),
        }
    }

    pub fn input_directory(&self) -> &Path {
        &self.input_directory
    }

    /// Files with a supported extension, sorted by path. Subdirectories are
    /// not descended into.
    pub fn scan(&self, limits: &ExtractionLimits) -> Result<Vec<PathBuf>, WorkerError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.input_directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| WorkerError::ScanFailed {
                path: self.input_directory.clone(),
                source,
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if limits.supports_path(path) {
                debug!("Found document: {}", crate::sanitize::redact_path(path));
                files.push(path.to_path_buf());
            } else {
                debug!("Skipping unsupported file: {}", crate::sanitize::redact_path(path));
            }
        }

        info!(
            "Scanned {} documents in {}",
            files.len(),
            self.input_directory.display()
        );
        Ok(files)
    }
}
