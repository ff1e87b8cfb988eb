//! File and directory records produced by the local file store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Metadata for a successfully stored file. Immutable once created; removed only
/// by an explicit delete operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path of the stored file under the base directory.
    pub path: PathBuf,
    /// Filename the caller originally supplied, before sanitization.
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Descriptor for a project/album directory. Created lazily on first upload,
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub path: PathBuf,
    pub project_code: String,
    pub album_name: String,
    pub created_at: DateTime<Utc>,
}

/// Progress snapshot reported after each chunk of a large-file upload.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UploadProgress {
    pub uploaded: u64,
    pub total: u64,
    pub percentage: f64,
}

impl UploadProgress {
    pub fn new(uploaded: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            (uploaded as f64 / total as f64) * 100.0
        };
        Self {
            uploaded,
            total,
            percentage,
        }
    }
}

/// One failed item of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub file: String,
    pub error: String,
}

/// Accumulated result of a batch run. Every input file yields exactly one
/// entry, either in `successful` or in `failed`.
#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    pub successful: Vec<FileRecord>,
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}

/// How `delete_file` disposes of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Rename the file to a `.deleted.<timestamp>` sibling so it can be restored.
    Soft,
    /// Unlink the file.
    Hard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_progress_percentage() {
        let progress = UploadProgress::new(512, 2048);
        assert_eq!(progress.percentage, 25.0);

        let done = UploadProgress::new(2048, 2048);
        assert_eq!(done.percentage, 100.0);
    }

    #[test]
    fn test_upload_progress_empty_file_is_complete() {
        let progress = UploadProgress::new(0, 0);
        assert_eq!(progress.percentage, 100.0);
    }
}
