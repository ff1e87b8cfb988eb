//! Carrier types for the integrated upload validation pipeline.

use std::path::PathBuf;

use serde::Serialize;

use sitevault_core::models::{ConflictCheck, QuotaInfo};
use sitevault_infra::RateLimitDecision;

/// An upload request as received from the web layer. The payload itself stays
/// with the caller; validation only needs the size and the leading bytes for
/// signature verification.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub original_filename: String,
    pub declared_mime: String,
    pub size: u64,
    /// First bytes of the payload, enough for magic-number checks.
    pub head: Vec<u8>,
    pub project_code: String,
    pub album_name: String,
    /// Opaque user identifier; authentication happens outside this core.
    pub user_id: String,
}

/// Result of the security stage: filename safety, MIME allow-list, and file
/// signature verification.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityStage {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Result of the quota stage. All three gates - global quota, per-project
/// quota, and the upload rate limit - must admit the requested size.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStage {
    pub valid: bool,
    pub errors: Vec<String>,
    pub global: QuotaInfo,
    pub project: QuotaInfo,
    #[serde(skip)]
    pub rate_limit: RateLimitDecision,
}

/// Aggregate pre-flight decision returned once per upload attempt. Warnings
/// are non-fatal; errors from any stage make `can_proceed` false.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub can_proceed: bool,
    pub security: SecurityStage,
    /// Absent when an earlier stage already failed.
    pub quota: Option<QuotaStage>,
    /// Absent when an earlier stage already failed.
    pub conflict: Option<ConflictCheck>,
    /// Where the upload should land if it proceeds.
    pub recommended_path: Option<PathBuf>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}
