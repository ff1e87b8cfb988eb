//! Local filesystem file store.
//!
//! Owns all on-disk bytes under the configured base directory. Every operation
//! returns a tagged `Result` - no error crosses this boundary as a panic - and
//! batch runs isolate per-item failures from the overall call.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use sitevault_core::error::AppError;
use sitevault_core::models::{
    BatchFailure, BatchOutcome, ConflictStrategy, DeleteMode, DirectoryRecord, FileRecord,
    QuotaInfo, ResourceStatus, UploadProgress,
};
use sitevault_core::validation::PathValidator;
use sitevault_core::{NoOpUsageReporter, StorageConfig, UsageReporter};

use crate::conflict::ConflictResolver;
use crate::paths;
use crate::resources;

/// Marker inserted into soft-deleted filenames; such entries are hidden from
/// directory listings.
const SOFT_DELETE_MARKER: &str = ".deleted.";

/// Per-upload options for `upload_file`.
#[derive(Default, Clone)]
pub struct UploadOptions {
    /// MIME type the caller declared; recorded on the FileRecord. Derived from
    /// the extension when absent.
    pub declared_mime: Option<String>,
    /// Strategy to apply when the target already exists. Without one, a
    /// conflict fails the upload with suggested alternate names.
    pub on_conflict: Option<ConflictStrategy>,
}

/// Local filesystem storage for project/album file trees.
#[derive(Clone)]
pub struct LocalFileStore {
    config: StorageConfig,
    validator: Arc<PathValidator>,
    conflicts: Arc<ConflictResolver>,
    usage: Arc<dyn UsageReporter>,
}

impl LocalFileStore {
    /// Create a new store rooted at `config.base_dir`, creating the directory
    /// if needed.
    pub async fn new(config: StorageConfig) -> Result<Self, AppError> {
        fs::create_dir_all(&config.base_dir).await.map_err(|e| {
            AppError::Disk(format!(
                "Failed to create storage directory {}: {}",
                config.base_dir.display(),
                e
            ))
        })?;

        let validator = Arc::new(PathValidator::new(config.allowed_extensions.clone()));

        Ok(Self {
            config,
            validator,
            conflicts: Arc::new(ConflictResolver::new()),
            usage: Arc::new(NoOpUsageReporter),
        })
    }

    /// Attach a usage reporter; storage byte deltas are forwarded to it.
    pub fn with_usage_reporter(mut self, usage: Arc<dyn UsageReporter>) -> Self {
        self.usage = usage;
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    pub fn conflicts(&self) -> &ConflictResolver {
        &self.conflicts
    }

    /// Resolve the storage path a file would land at, proving containment in
    /// the base directory. No filesystem access beyond the containment proof.
    pub fn resolve_path(
        &self,
        project_code: &str,
        album_name: &str,
        filename: &str,
    ) -> Result<PathBuf, AppError> {
        paths::file_path(
            &self.validator,
            &self.config.base_dir,
            project_code,
            album_name,
            filename,
        )
    }

    /// Create the directory for a project/album pair. Idempotent: an existing
    /// directory yields its descriptor rather than an error.
    pub async fn create_directory(
        &self,
        project_code: &str,
        album_name: &str,
    ) -> Result<DirectoryRecord, AppError> {
        let dir = paths::album_dir(
            &self.validator,
            &self.config.base_dir,
            project_code,
            album_name,
        )?;

        if !fs::try_exists(&dir).await.unwrap_or(false) {
            fs::create_dir_all(&dir).await.map_err(|e| {
                AppError::Disk(format!("Failed to create directory {}: {}", dir.display(), e))
            })?;
            tracing::info!(
                path = %dir.display(),
                project_code = %project_code,
                album_name = %album_name,
                "Created album directory"
            );
        }

        let created_at = fs::metadata(&dir)
            .await
            .ok()
            .and_then(|m| m.created().ok())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);

        Ok(DirectoryRecord {
            path: dir,
            project_code: project_code.to_string(),
            album_name: album_name.to_string(),
            created_at,
        })
    }

    /// Store a file from an in-memory payload.
    ///
    /// Validates the filename, ensures the album directory, detects conflicts
    /// and applies the requested strategy. Returns `None` only when the caller
    /// chose `Skip` for an existing target. The write itself uses exclusive
    /// create so a concurrent writer appearing between the conflict check and
    /// the write surfaces as a fresh conflict rather than silent corruption.
    pub async fn upload_file(
        &self,
        project_code: &str,
        album_name: &str,
        original_name: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<Option<FileRecord>, AppError> {
        let check = self.validator.validate_filename(original_name);
        if !check.valid {
            return Err(AppError::Validation(check.errors.join("; ")));
        }

        if data.len() > self.config.max_file_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File size exceeds maximum allowed size of {} MB",
                self.config.max_file_size_bytes / 1024 / 1024
            )));
        }

        self.create_directory(project_code, album_name).await?;
        self.ensure_disk_headroom(data.len() as u64).await?;

        let safe_name = self.validator.sanitize_filename(original_name);
        let target = paths::file_path(
            &self.validator,
            &self.config.base_dir,
            project_code,
            album_name,
            &safe_name,
        )?;

        let (write_path, overwrite) = match self.pick_write_path(&target, &options).await? {
            Some(resolution) => resolution,
            None => {
                tracing::debug!(
                    target = %target.display(),
                    "Upload skipped by caller-requested conflict strategy"
                );
                return Ok(None);
            }
        };

        let start = Instant::now();
        let previous_size = if overwrite {
            fs::metadata(&write_path).await.map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };

        let mut file = self.open_target(&write_path, overwrite).await?;
        file.write_all(&data).await.map_err(|e| {
            AppError::Disk(format!(
                "Failed to write file {}: {}",
                write_path.display(),
                e
            ))
        })?;
        file.sync_all().await.map_err(|e| {
            AppError::Disk(format!("Failed to sync file {}: {}", write_path.display(), e))
        })?;

        let size = data.len() as u64;
        tracing::info!(
            path = %write_path.display(),
            project_code = %project_code,
            album_name = %album_name,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "File upload successful"
        );

        self.report_usage(project_code, size as i64 - previous_size as i64)
            .await;

        Ok(Some(FileRecord {
            path: write_path,
            original_name: original_name.to_string(),
            size,
            mime_type: self.mime_type_for(&safe_name, options.declared_mime),
            uploaded_at: Utc::now(),
        }))
    }

    /// Copy a large file into the store in fixed-size chunks, reporting
    /// progress after every chunk.
    ///
    /// The source is never loaded into memory as a whole. Cancellation happens
    /// by the caller dropping the future; a truncated target file may remain on
    /// disk in that case.
    pub async fn upload_large_file(
        &self,
        source: &Path,
        project_code: &str,
        album_name: &str,
        mut on_progress: impl FnMut(UploadProgress),
    ) -> Result<FileRecord, AppError> {
        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Validation("Source path has no filename".to_string()))?;

        let check = self.validator.validate_filename(filename);
        if !check.valid {
            return Err(AppError::Validation(check.errors.join("; ")));
        }

        let total = fs::metadata(source)
            .await
            .map_err(|e| AppError::NotFound(format!("Source file {}: {}", source.display(), e)))?
            .len();

        if total > self.config.max_file_size_bytes as u64 {
            return Err(AppError::PayloadTooLarge(format!(
                "File size exceeds maximum allowed size of {} MB",
                self.config.max_file_size_bytes / 1024 / 1024
            )));
        }

        self.create_directory(project_code, album_name).await?;
        self.ensure_disk_headroom(total).await?;

        let safe_name = self.validator.sanitize_filename(filename);
        let target = paths::file_path(
            &self.validator,
            &self.config.base_dir,
            project_code,
            album_name,
            &safe_name,
        )?;

        let conflict = self.conflicts.detect(&target).await?;
        if conflict.has_conflict {
            return Err(self.conflict_error(&target, &conflict));
        }

        let start = Instant::now();
        let mut reader = fs::File::open(source).await.map_err(|e| {
            AppError::Disk(format!("Failed to open source {}: {}", source.display(), e))
        })?;
        let mut writer = self.open_target(&target, false).await?;

        let mut buffer = vec![0u8; self.config.chunk_size_bytes];
        let mut uploaded: u64 = 0;
        loop {
            let read = reader.read(&mut buffer).await.map_err(|e| {
                AppError::Disk(format!("Failed to read source {}: {}", source.display(), e))
            })?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).await.map_err(|e| {
                AppError::Disk(format!("Failed to write file {}: {}", target.display(), e))
            })?;
            uploaded += read as u64;
            on_progress(UploadProgress::new(uploaded, total));
        }

        writer.sync_all().await.map_err(|e| {
            AppError::Disk(format!("Failed to sync file {}: {}", target.display(), e))
        })?;

        tracing::info!(
            path = %target.display(),
            source = %source.display(),
            size_bytes = uploaded,
            chunk_size = self.config.chunk_size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Chunked upload successful"
        );

        self.report_usage(project_code, uploaded as i64).await;

        Ok(FileRecord {
            path: target,
            original_name: filename.to_string(),
            size: uploaded,
            mime_type: self.mime_type_for(&safe_name, None),
            uploaded_at: Utc::now(),
        })
    }

    /// Upload a list of source files in sequential groups of `concurrency`.
    ///
    /// Items inside a group run concurrently with no ordering guarantee; a
    /// group is fully drained before the next one starts. Every input yields
    /// exactly one outcome - a single failure never aborts the batch.
    pub async fn process_batch(
        &self,
        sources: &[PathBuf],
        project_code: &str,
        album_name: &str,
        concurrency: usize,
    ) -> BatchOutcome {
        let batch_id = Uuid::new_v4();
        let group_size = concurrency.max(1);

        tracing::info!(
            batch_id = %batch_id,
            file_count = sources.len(),
            concurrency = group_size,
            "Starting batch upload"
        );

        let mut outcome = BatchOutcome::default();

        for group in sources.chunks(group_size) {
            let results = join_all(group.iter().map(|source| async move {
                let result = self
                    .upload_large_file(source, project_code, album_name, |_| {})
                    .await;
                (source, result)
            }))
            .await;

            for (source, result) in results {
                match result {
                    Ok(record) => outcome.successful.push(record),
                    Err(e) => {
                        tracing::warn!(
                            batch_id = %batch_id,
                            file = %source.display(),
                            error = %e,
                            "Batch item failed"
                        );
                        outcome.failed.push(BatchFailure {
                            file: source.display().to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            batch_id = %batch_id,
            successful = outcome.successful.len(),
            failed = outcome.failed.len(),
            "Batch upload finished"
        );

        outcome
    }

    /// Delete a stored file, either by unlinking it or by renaming it aside.
    pub async fn delete_file(
        &self,
        project_code: &str,
        album_name: &str,
        filename: &str,
        mode: DeleteMode,
    ) -> Result<(), AppError> {
        let target = paths::file_path(
            &self.validator,
            &self.config.base_dir,
            project_code,
            album_name,
            filename,
        )?;

        if !fs::try_exists(&target).await.unwrap_or(false) {
            return Err(AppError::NotFound(format!(
                "File {} does not exist",
                target.display()
            )));
        }

        let size = fs::metadata(&target).await.map(|m| m.len()).unwrap_or(0);

        match mode {
            DeleteMode::Hard => {
                fs::remove_file(&target).await.map_err(|e| {
                    AppError::Disk(format!("Failed to delete {}: {}", target.display(), e))
                })?;
            }
            DeleteMode::Soft => {
                let aside = target.with_file_name(format!(
                    "{}{}{}",
                    filename,
                    SOFT_DELETE_MARKER,
                    Utc::now().timestamp()
                ));
                fs::rename(&target, &aside).await.map_err(|e| {
                    AppError::Disk(format!("Failed to soft-delete {}: {}", target.display(), e))
                })?;
            }
        }

        tracing::info!(
            path = %target.display(),
            mode = ?mode,
            size_bytes = size,
            "File deleted"
        );

        if mode == DeleteMode::Hard {
            self.report_usage(project_code, -(size as i64)).await;
        }

        Ok(())
    }

    pub async fn file_exists(
        &self,
        project_code: &str,
        album_name: &str,
        filename: &str,
    ) -> Result<bool, AppError> {
        let target = paths::file_path(
            &self.validator,
            &self.config.base_dir,
            project_code,
            album_name,
            filename,
        )?;
        Ok(fs::try_exists(&target).await.unwrap_or(false))
    }

    /// List stored files in an album, newest first. Soft-deleted entries are
    /// hidden.
    pub async fn directory_listing(
        &self,
        project_code: &str,
        album_name: &str,
    ) -> Result<Vec<FileRecord>, AppError> {
        let dir = paths::album_dir(
            &self.validator,
            &self.config.base_dir,
            project_code,
            album_name,
        )?;

        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(AppError::NotFound(format!(
                "Album directory {} does not exist",
                dir.display()
            )));
        }

        let mut entries = fs::read_dir(&dir).await.map_err(|e| {
            AppError::Disk(format!("Failed to list {}: {}", dir.display(), e))
        })?;

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            AppError::Disk(format!("Failed to list {}: {}", dir.display(), e))
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(SOFT_DELETE_MARKER) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            records.push(FileRecord {
                path: entry.path(),
                original_name: name.clone(),
                size: metadata.len(),
                mime_type: self.mime_type_for(&name, None),
                uploaded_at: metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
            });
        }

        records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(records)
    }

    /// Cumulative bytes stored under the base directory against the configured
    /// quota. Recomputed per query, never cached.
    pub async fn storage_quota(&self) -> Result<QuotaInfo, AppError> {
        let used = dir_size(&self.config.base_dir).await?;
        Ok(QuotaInfo::new(used, self.config.total_quota_bytes))
    }

    /// Cumulative bytes stored under one project directory against the
    /// per-project quota.
    pub async fn project_quota(&self, project_code: &str) -> Result<QuotaInfo, AppError> {
        let dir = self
            .validator
            .resolve_within_base(&self.config.base_dir, &[project_code])?;
        let used = if fs::try_exists(&dir).await.unwrap_or(false) {
            dir_size(&dir).await?
        } else {
            0
        };
        Ok(QuotaInfo::new(used, self.config.project_quota_bytes))
    }

    /// Disk and memory snapshot for upload admission decisions.
    pub async fn check_system_resources(&self) -> Result<ResourceStatus, AppError> {
        let base = self.config.base_dir.clone();
        let min_free = self.config.min_disk_free_bytes;
        tokio::task::spawn_blocking(move || resources::resource_status(&base, min_free))
            .await
            .map_err(|e| AppError::Internal(format!("spawn_blocking for resource check: {}", e)))?
    }

    /// Conflict check plus strategy application for `upload_file`. `Ok(None)`
    /// means the caller chose `Skip`; the bool marks an overwrite.
    async fn pick_write_path(
        &self,
        target: &Path,
        options: &UploadOptions,
    ) -> Result<Option<(PathBuf, bool)>, AppError> {
        let conflict = self.conflicts.detect(target).await?;
        if !conflict.has_conflict {
            return Ok(Some((target.to_path_buf(), false)));
        }

        let strategy = match options.on_conflict {
            Some(strategy) => strategy,
            None => return Err(self.conflict_error(target, &conflict)),
        };

        match self.conflicts.resolve(target, strategy).await? {
            Some(path) => Ok(Some((path, strategy == ConflictStrategy::Overwrite))),
            None => Ok(None),
        }
    }

    /// Open the write target. Non-overwrite paths use exclusive create; losing
    /// the race to another writer becomes a fresh conflict.
    async fn open_target(&self, path: &Path, overwrite: bool) -> Result<fs::File, AppError> {
        let mut open_options = fs::OpenOptions::new();
        open_options.write(true);
        if overwrite {
            open_options.create(true).truncate(true);
        } else {
            open_options.create_new(true);
        }

        match open_options.open(path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let conflict = self.conflicts.detect(path).await?;
                Err(self.conflict_error(path, &conflict))
            }
            Err(e) => Err(AppError::Disk(format!(
                "Failed to create file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn conflict_error(&self, target: &Path, conflict: &sitevault_core::models::ConflictCheck) -> AppError {
        let suggestions = conflict
            .options
            .iter()
            .filter(|o| o.strategy == ConflictStrategy::Rename)
            .filter_map(|o| o.resulting_path.file_name())
            .filter_map(|n| n.to_str())
            .map(|n| n.to_string())
            .collect();
        AppError::FileConflict {
            path: target.display().to_string(),
            suggestions,
        }
    }

    async fn ensure_disk_headroom(&self, required_bytes: u64) -> Result<(), AppError> {
        let base = self.config.base_dir.clone();
        let min_free = self.config.min_disk_free_bytes;
        tokio::task::spawn_blocking(move || {
            resources::check_disk_headroom(&base, required_bytes, min_free)
        })
        .await
        .map_err(|e| AppError::Internal(format!("spawn_blocking for disk check: {}", e)))?
    }

    fn mime_type_for(&self, filename: &str, declared: Option<String>) -> String {
        declared.unwrap_or_else(|| {
            let extension = Path::new(filename)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            paths::mime_for_extension(extension).to_string()
        })
    }

    async fn report_usage(&self, project_code: &str, bytes_delta: i64) {
        if bytes_delta == 0 {
            return;
        }
        if let Err(e) = self
            .usage
            .report_storage_change(project_code, bytes_delta)
            .await
        {
            tracing::warn!(
                project_code = %project_code,
                bytes_delta = bytes_delta,
                error = %e,
                "Usage reporter rejected storage change"
            );
        }
    }
}

/// Total size in bytes of all files under `path`, iteratively.
async fn dir_size(path: &Path) -> Result<u64, AppError> {
    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir).await.map_err(|e| {
            AppError::Disk(format!("Failed to read {}: {}", dir.display(), e))
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            AppError::Disk(format!("Failed to read {}: {}", dir.display(), e))
        })? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.is_dir() {
                stack.push(entry.path());
            } else {
                total += metadata.len();
            }
        }
    }

    Ok(total)
}
