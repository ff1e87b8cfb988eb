//! Configuration module
//!
//! This module provides the configuration surface for the storage core: base
//! directory, size limits, allowed file types, quota ceilings, and per-operation
//! rate-limit tuples. Everything is explicit configuration rather than global
//! constants so the core stays testable.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::DEFAULT_CHUNK_SIZE_BYTES;

// Default limits
const MAX_FILE_SIZE_MB: usize = 50;
const LARGE_FILE_WARNING_MB: usize = 25;
const TOTAL_QUOTA_GB: u64 = 50;
const PROJECT_QUOTA_GB: u64 = 10;
const MIN_DISK_FREE_GB: u64 = 1;
const SWEEP_INTERVAL_SECS: u64 = 300;

/// Operation classes the rate limiter distinguishes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Api,
    Upload,
    Download,
    Batch,
    Search,
    Auth,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Api => "api",
            OperationType::Upload => "upload",
            OperationType::Download => "download",
            OperationType::Batch => "batch",
            OperationType::Search => "search",
            OperationType::Auth => "auth",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate-limit tuple for one operation type. Callers may override per call.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    pub block_duration: Duration,
    /// Do not count requests the caller reports as successful
    pub skip_successful: bool,
    /// Do not count requests the caller reports as failed
    pub skip_failed: bool,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration, block_duration: Duration) -> Self {
        Self {
            max_requests,
            window,
            block_duration,
            skip_successful: false,
            skip_failed: false,
        }
    }

    /// Default tuple for an operation type.
    pub fn for_operation(operation: OperationType) -> Self {
        let (max_requests, window_secs, block_secs) = match operation {
            OperationType::Api => (100, 60, 300),
            OperationType::Upload => (20, 60, 600),
            OperationType::Download => (60, 60, 300),
            OperationType::Batch => (5, 60, 900),
            OperationType::Search => (30, 60, 300),
            OperationType::Auth => (10, 900, 1800),
        };
        Self::new(
            max_requests,
            Duration::from_secs(window_secs),
            Duration::from_secs(block_secs),
        )
    }
}

/// Configuration for the local storage core.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Root directory all files live under; nothing is ever written outside it.
    pub base_dir: PathBuf,
    pub max_file_size_bytes: usize,
    /// Uploads above this size get a non-fatal warning in validation reports.
    pub large_file_warning_bytes: usize,
    pub chunk_size_bytes: usize,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
    /// Ceiling on cumulative bytes under `base_dir`.
    pub total_quota_bytes: u64,
    /// Ceiling on cumulative bytes under a single project directory.
    pub project_quota_bytes: u64,
    /// Free-space headroom the disk must keep after a write is admitted.
    pub min_disk_free_bytes: u64,
    /// Interval between rate-limit record sweeps.
    pub sweep_interval: Duration,
    pub environment: String,
}

impl StorageConfig {
    /// Build configuration from the environment with sensible defaults.
    /// Only `SITEVAULT_BASE_DIR` is required.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let base_dir = env::var("SITEVAULT_BASE_DIR")
            .map_err(|_| anyhow::anyhow!("SITEVAULT_BASE_DIR must be set"))?;

        let max_file_size_mb = env::var("MAX_FILE_SIZE_MB")
            .unwrap_or_else(|_| MAX_FILE_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_FILE_SIZE_MB);

        let large_file_warning_mb = env::var("LARGE_FILE_WARNING_MB")
            .unwrap_or_else(|_| LARGE_FILE_WARNING_MB.to_string())
            .parse::<usize>()
            .unwrap_or(LARGE_FILE_WARNING_MB);

        let allowed_extensions = env::var("ALLOWED_EXTENSIONS")
            .unwrap_or_else(|_| "jpg,jpeg,png,gif,webp,bmp,tiff,pdf,doc,docx,xls,xlsx,txt".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .collect();

        let allowed_content_types = env::var("ALLOWED_CONTENT_TYPES")
            .unwrap_or_else(|_| {
                "image/jpeg,image/png,image/gif,image/webp,image/bmp,image/tiff,\
                 application/pdf,application/msword,\
                 application/vnd.openxmlformats-officedocument.wordprocessingml.document,\
                 application/vnd.ms-excel,\
                 application/vnd.openxmlformats-officedocument.spreadsheetml.sheet,\
                 text/plain"
                    .to_string()
            })
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .collect();

        Ok(Self {
            base_dir: PathBuf::from(base_dir),
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            large_file_warning_bytes: large_file_warning_mb * 1024 * 1024,
            chunk_size_bytes: env::var("UPLOAD_CHUNK_SIZE_BYTES")
                .unwrap_or_else(|_| DEFAULT_CHUNK_SIZE_BYTES.to_string())
                .parse()
                .unwrap_or(DEFAULT_CHUNK_SIZE_BYTES),
            allowed_extensions,
            allowed_content_types,
            total_quota_bytes: env::var("TOTAL_QUOTA_GB")
                .unwrap_or_else(|_| TOTAL_QUOTA_GB.to_string())
                .parse::<u64>()
                .unwrap_or(TOTAL_QUOTA_GB)
                * 1024
                * 1024
                * 1024,
            project_quota_bytes: env::var("PROJECT_QUOTA_GB")
                .unwrap_or_else(|_| PROJECT_QUOTA_GB.to_string())
                .parse::<u64>()
                .unwrap_or(PROJECT_QUOTA_GB)
                * 1024
                * 1024
                * 1024,
            min_disk_free_bytes: env::var("MIN_DISK_FREE_GB")
                .unwrap_or_else(|_| MIN_DISK_FREE_GB.to_string())
                .parse::<u64>()
                .unwrap_or(MIN_DISK_FREE_GB)
                * 1024
                * 1024
                * 1024,
            sweep_interval: Duration::from_secs(
                env::var("RATE_LIMIT_SWEEP_INTERVAL_SECS")
                    .unwrap_or_else(|_| SWEEP_INTERVAL_SECS.to_string())
                    .parse()
                    .unwrap_or(SWEEP_INTERVAL_SECS),
            ),
            environment: env::var("ENVIRONMENT")
                .or_else(|_| env::var("APP_ENV"))
                .unwrap_or_else(|_| "development".to_string()),
        })
    }

    /// Configuration rooted at an explicit directory, defaults everywhere else.
    /// Intended for tests and embedded use.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_file_size_bytes: MAX_FILE_SIZE_MB * 1024 * 1024,
            large_file_warning_bytes: LARGE_FILE_WARNING_MB * 1024 * 1024,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            allowed_extensions: [
                "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "pdf", "doc", "docx", "xls",
                "xlsx", "txt",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            allowed_content_types: [
                "image/jpeg",
                "image/png",
                "image/gif",
                "image/webp",
                "image/bmp",
                "image/tiff",
                "application/pdf",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "text/plain",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            total_quota_bytes: TOTAL_QUOTA_GB * 1024 * 1024 * 1024,
            project_quota_bytes: PROJECT_QUOTA_GB * 1024 * 1024 * 1024,
            min_disk_free_bytes: MIN_DISK_FREE_GB * 1024 * 1024 * 1024,
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
            environment: "development".to_string(),
        }
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("max_file_size_bytes must be non-zero"));
        }
        if self.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("chunk_size_bytes must be non-zero"));
        }
        if self.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!("allowed_extensions must not be empty"));
        }
        if self.project_quota_bytes > self.total_quota_bytes {
            return Err(anyhow::anyhow!(
                "project_quota_bytes cannot exceed total_quota_bytes"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base_dir_defaults_validate() {
        let config = StorageConfig::with_base_dir("/tmp/sitevault-test");
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size_bytes, DEFAULT_CHUNK_SIZE_BYTES);
        assert!(config.allowed_extensions.contains(&"jpg".to_string()));
        assert!(!config.is_production());
    }

    #[test]
    fn test_operation_defaults_differ() {
        let upload = RateLimitConfig::for_operation(OperationType::Upload);
        let api = RateLimitConfig::for_operation(OperationType::Api);
        assert!(upload.max_requests < api.max_requests);
        assert!(upload.block_duration > api.block_duration);
    }

    #[test]
    fn test_validate_rejects_inverted_quotas() {
        let mut config = StorageConfig::with_base_dir("/tmp/sitevault-test");
        config.project_quota_bytes = config.total_quota_bytes + 1;
        assert!(config.validate().is_err());
    }
}
