//! Integrated upload validation service
//!
//! Runs the pre-flight pipeline for an upload request:
//! security -> quota -> conflict, short-circuiting on the first hard failure.
//! The caller performs the actual write through `LocalFileStore` afterwards.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use sitevault_core::error::AppError;
use sitevault_core::{OperationType, RateLimitConfig};
use sitevault_infra::RateLimiter;
use sitevault_storage::LocalFileStore;

use super::signature::verify_signature;
use super::types::{QuotaStage, SecurityStage, UploadRequest, ValidationReport};

/// Composes path security, quotas, rate limiting, and conflict detection into
/// one decision. Owns no state of its own.
pub struct UploadValidator {
    store: Arc<LocalFileStore>,
    rate_limiter: Arc<RateLimiter>,
    upload_rate_config: RateLimitConfig,
}

impl UploadValidator {
    pub fn new(store: Arc<LocalFileStore>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            store,
            rate_limiter,
            upload_rate_config: RateLimitConfig::for_operation(OperationType::Upload),
        }
    }

    /// Override the rate-limit tuple applied to upload checks.
    pub fn with_rate_limit_config(mut self, config: RateLimitConfig) -> Self {
        self.upload_rate_config = config;
        self
    }

    /// Run the full pre-flight validation for one upload attempt.
    ///
    /// Stages run in order and short-circuit on the first hard failure; later
    /// stage results are absent in that case. Conflicts at the recommended
    /// destination are warnings, not errors - the destination is adjusted
    /// instead. Errors are only returned for infrastructure failures during
    /// the checks themselves.
    pub async fn integrated_validation(
        &self,
        request: &UploadRequest,
    ) -> Result<ValidationReport, AppError> {
        // 1. Security: filename safety, MIME allow-list, file signature
        let security = self.security_stage(request);
        if !security.valid {
            tracing::debug!(
                filename = %request.original_filename,
                user_id = %request.user_id,
                errors = ?security.errors,
                "Upload rejected by security validation"
            );
            let errors = security.errors.clone();
            return Ok(ValidationReport {
                can_proceed: false,
                security,
                quota: None,
                conflict: None,
                recommended_path: None,
                warnings: Vec::new(),
                errors,
            });
        }

        // 2. Quota: global ceiling, per-project ceiling, upload rate limit
        let quota = self.quota_stage(request).await?;
        if !quota.valid {
            tracing::debug!(
                project_code = %request.project_code,
                user_id = %request.user_id,
                errors = ?quota.errors,
                "Upload rejected by quota validation"
            );
            let errors = quota.errors.clone();
            return Ok(ValidationReport {
                can_proceed: false,
                security,
                quota: Some(quota),
                conflict: None,
                recommended_path: None,
                warnings: Vec::new(),
                errors,
            });
        }

        // 3. Destination and conflict detection
        let mut warnings = Vec::new();

        if request.size as usize >= self.store.config().large_file_warning_bytes {
            warnings.push(format!(
                "Large upload ({} MB); consider the chunked upload path",
                request.size / 1024 / 1024
            ));
        }

        let safe_name = self
            .store
            .validator()
            .sanitize_filename(&request.original_filename);

        if self
            .store
            .file_exists(&request.project_code, &request.album_name, &safe_name)
            .await?
        {
            warnings.push(format!(
                "A file named '{}' already exists in this album",
                safe_name
            ));
        }

        let recommended_name = timestamped_name(&safe_name);
        let mut recommended_path = self.store.resolve_path(
            &request.project_code,
            &request.album_name,
            &recommended_name,
        )?;

        let conflict = self.store.conflicts().detect(&recommended_path).await?;
        if conflict.has_conflict {
            // Extremely unlikely with the timestamp convention; fall back to
            // the resolver's rename candidate
            if let Some(option) = conflict.options.first() {
                recommended_path = option.resulting_path.clone();
            }
            warnings.push("Recommended destination was taken; using an alternate name".to_string());
        }

        tracing::info!(
            filename = %request.original_filename,
            project_code = %request.project_code,
            album_name = %request.album_name,
            user_id = %request.user_id,
            size_bytes = request.size,
            recommended_path = %recommended_path.display(),
            "Upload validation passed"
        );

        Ok(ValidationReport {
            can_proceed: true,
            security,
            quota: Some(quota),
            conflict: Some(conflict),
            recommended_path: Some(recommended_path),
            warnings,
            errors: Vec::new(),
        })
    }

    /// Pure checks only - no filesystem access happens before this stage
    /// passes.
    fn security_stage(&self, request: &UploadRequest) -> SecurityStage {
        let mut errors = Vec::new();

        let filename_check = self
            .store
            .validator()
            .validate_filename(&request.original_filename);
        errors.extend(filename_check.errors);

        let segment_check = self
            .store
            .validator()
            .validate_path_segments(&request.project_code, &request.album_name);
        errors.extend(segment_check.errors);

        let declared = normalize_mime(&request.declared_mime);
        if !self
            .store
            .config()
            .allowed_content_types
            .iter()
            .any(|ct| declared == ct.to_lowercase())
        {
            errors.push(format!(
                "Content type '{}' is not allowed",
                request.declared_mime
            ));
        } else if let Err(e) = verify_signature(&request.declared_mime, &request.head) {
            errors.push(e);
        }

        if request.size as usize > self.store.config().max_file_size_bytes {
            errors.push(format!(
                "File size exceeds maximum allowed size of {} MB",
                self.store.config().max_file_size_bytes / 1024 / 1024
            ));
        }

        SecurityStage {
            valid: errors.is_empty(),
            errors,
        }
    }

    async fn quota_stage(&self, request: &UploadRequest) -> Result<QuotaStage, AppError> {
        let mut errors = Vec::new();

        let global = self.store.storage_quota().await?;
        if !global.admits(request.size) {
            errors.push(format!(
                "Global storage quota exceeded: {} of {} bytes used, {} requested",
                global.total_used, global.total_limit, request.size
            ));
        }

        let project = self.store.project_quota(&request.project_code).await?;
        if !project.admits(request.size) {
            errors.push(format!(
                "Project '{}' quota exceeded: {} of {} bytes used, {} requested",
                request.project_code, project.total_used, project.total_limit, request.size
            ));
        }

        let rate_limit = self
            .rate_limiter
            .check(
                OperationType::Upload,
                &request.user_id,
                Some(&self.upload_rate_config),
            )
            .await;
        if !rate_limit.allowed {
            let retry_secs = rate_limit
                .retry_after
                .map(|d| d.as_secs().max(1))
                .unwrap_or(1);
            errors.push(format!(
                "Upload rate limit exceeded; retry after {} seconds",
                retry_secs
            ));
        }

        let resources = self.store.check_system_resources().await?;
        if resources.disk_available_bytes
            < request
                .size
                .saturating_add(self.store.config().min_disk_free_bytes)
        {
            errors.push(format!(
                "Insufficient disk space: {} bytes available, {} requested",
                resources.disk_available_bytes, request.size
            ));
        }

        Ok(QuotaStage {
            valid: errors.is_empty(),
            errors,
            global,
            project,
            rate_limit,
        })
    }
}

/// `photo.jpg` -> `photo_<epoch seconds>.jpg`. The timestamp keeps repeated
/// uploads of the same name from landing on the same destination.
fn timestamped_name(safe_name: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let path = Path::new(safe_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(safe_name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, timestamp, ext),
        None => format!("{}_{}", stem, timestamp),
    }
}

/// Strip MIME parameters, e.g. "image/jpeg; charset=binary" -> "image/jpeg".
fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .map(|s| s.trim())
        .unwrap_or(content_type)
        .to_lowercase()
}
