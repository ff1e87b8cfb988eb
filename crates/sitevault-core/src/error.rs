//! Error types module
//!
//! This module provides the core error types used throughout the sitevault storage
//! subsystem. All errors are unified under the `AppError` enum which can represent
//! validation, conflict, quota, and filesystem errors.
//!
//! Rate-limit rejection is deliberately NOT an error variant: it is a normal decision
//! outcome (`RateLimitDecision::allowed == false`) returned by the rate limiter.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
/// This trait allows errors to self-describe their HTTP response characteristics
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "VALIDATION_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("File already exists at {path}")]
    FileConflict {
        path: String,
        /// Alternate filenames the caller may retry with.
        suggestions: Vec<String>,
    },

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Disk error: {0}")]
    Disk(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage quota exceeded: {used}/{limit} bytes used")]
    QuotaExceeded { used: u64, limit: u64 },

    #[error("Insufficient disk space: {available} bytes available, {required} bytes required")]
    InsufficientDiskSpace { available: u64, required: u64 },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

// Error conversion implementations following Rust best practices
impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => AppError::NotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => AppError::Permission(err.to_string()),
            _ => AppError::Disk(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, log_level).
/// Reduces duplication in the ErrorMetadata impl; client_message stays per-variant for dynamic content.
fn app_error_static_metadata(
    err: &AppError,
) -> (u16, &'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        AppError::Validation(_) => (
            400,
            "VALIDATION_ERROR",
            false,
            Some("Check the filename and file type and try again"),
            LogLevel::Debug,
        ),
        AppError::FileConflict { .. } => (
            409,
            "FILE_CONFLICT",
            false,
            Some("Choose a resolution strategy: rename, overwrite, or skip"),
            LogLevel::Debug,
        ),
        AppError::Permission(_) => (
            403,
            "PERMISSION_ERROR",
            false,
            Some("Verify access rights for this project"),
            LogLevel::Warn,
        ),
        AppError::Disk(_) => (
            500,
            "DISK_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the file or directory exists"),
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size or use chunked upload"),
            LogLevel::Debug,
        ),
        AppError::QuotaExceeded { .. } => (
            402,
            "QUOTA_EXCEEDED",
            false,
            Some("Free up storage or wait for quota changes"),
            LogLevel::Warn,
        ),
        AppError::InsufficientDiskSpace { .. } => (
            507,
            "INSUFFICIENT_DISK_SPACE",
            true,
            Some("Retry after cleanup or wait for capacity"),
            LogLevel::Warn,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Validation(_) => "Validation",
            AppError::FileConflict { .. } => "FileConflict",
            AppError::Permission(_) => "Permission",
            AppError::Disk(_) => "Disk",
            AppError::NotFound(_) => "NotFound",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::QuotaExceeded { .. } => "QuotaExceeded",
            AppError::InsufficientDiskSpace { .. } => "InsufficientDiskSpace",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Alternate filenames carried by a `FileConflict`, empty for other variants.
    pub fn conflict_suggestions(&self) -> &[String] {
        match self {
            AppError::FileConflict { suggestions, .. } => suggestions,
            _ => &[],
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).4
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Validation(ref msg) => msg.clone(),
            AppError::FileConflict { path, suggestions } => {
                if suggestions.is_empty() {
                    format!("A file already exists at {}", path)
                } else {
                    format!(
                        "A file already exists at {}. Suggested alternatives: {}",
                        path,
                        suggestions.join(", ")
                    )
                }
            }
            AppError::Permission(ref msg) => msg.clone(),
            AppError::Disk(_) => "Storage is temporarily unavailable".to_string(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::QuotaExceeded { used, limit } => {
                format!("Storage quota exceeded: {}/{} bytes used", used, limit)
            }
            AppError::InsufficientDiskSpace {
                available,
                required,
            } => {
                format!(
                    "Insufficient disk space: {} bytes available, {} bytes required",
                    available, required
                )
            }
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_validation() {
        let err = AppError::Validation("Filename contains path traversal".to_string());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "Filename contains path traversal");
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_error_metadata_file_conflict_carries_suggestions() {
        let err = AppError::FileConflict {
            path: "P1/A1/plan.pdf".to_string(),
            suggestions: vec!["plan_1700000000.pdf".to_string()],
        };
        assert_eq!(err.http_status_code(), 409);
        assert_eq!(err.error_code(), "FILE_CONFLICT");
        assert_eq!(err.conflict_suggestions().len(), 1);
        assert!(err.client_message().contains("plan_1700000000.pdf"));
    }

    #[test]
    fn test_error_metadata_disk_is_recoverable() {
        let err = AppError::Disk("write failed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DISK_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_error_metadata_quota_exceeded() {
        let err = AppError::QuotaExceeded {
            used: 100,
            limit: 50,
        };
        assert_eq!(err.error_code(), "QUOTA_EXCEEDED");
        assert!(err.client_message().contains("100"));
        assert!(err.client_message().contains("50"));
        assert_eq!(err.log_level(), LogLevel::Warn);
    }

    #[test]
    fn test_io_error_kind_mapping() {
        let not_found = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(AppError::from(not_found).error_code(), "NOT_FOUND");

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(AppError::from(denied).error_code(), "PERMISSION_ERROR");

        let other = io::Error::new(io::ErrorKind::Other, "disk on fire");
        assert_eq!(AppError::from(other).error_code(), "DISK_ERROR");
    }
}
