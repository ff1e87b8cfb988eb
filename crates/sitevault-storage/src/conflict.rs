//! Conflict detection and resolution for write targets that already exist.
//!
//! Detection is a single existence check; resolution is pure name computation.
//! The rename candidate is guaranteed collision-free at check time only - the
//! actual write closes the remaining race with an exclusive create.

use std::path::{Path, PathBuf};

use sitevault_core::error::AppError;
use sitevault_core::models::{ConflictCheck, ConflictOption, ConflictStrategy};

pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Check whether `target` already exists and, if so, propose the three
    /// resolution strategies in order: rename, overwrite, skip.
    pub async fn detect(&self, target: &Path) -> Result<ConflictCheck, AppError> {
        if !tokio::fs::try_exists(target).await.unwrap_or(false) {
            return Ok(ConflictCheck::clear());
        }

        let renamed = self.rename_candidate(target).await?;
        let options = vec![
            ConflictOption {
                strategy: ConflictStrategy::Rename,
                resulting_path: renamed.clone(),
                description: format!(
                    "Keep both files; store the new upload as '{}'",
                    renamed
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or_default()
                ),
            },
            ConflictOption {
                strategy: ConflictStrategy::Overwrite,
                resulting_path: target.to_path_buf(),
                description: "Replace the existing file. This cannot be undone".to_string(),
            },
            ConflictOption {
                strategy: ConflictStrategy::Skip,
                resulting_path: PathBuf::new(),
                description: "Keep the existing file and discard the upload".to_string(),
            },
        ];

        tracing::debug!(
            target = %target.display(),
            rename_candidate = %renamed.display(),
            "Write target already exists"
        );

        Ok(ConflictCheck {
            has_conflict: true,
            options,
        })
    }

    /// Apply a chosen strategy to a target path. Returns `None` for `Skip`,
    /// signaling that no write should happen. Performs no I/O beyond the
    /// collision check needed to compute the rename candidate.
    pub async fn resolve(
        &self,
        target: &Path,
        strategy: ConflictStrategy,
    ) -> Result<Option<PathBuf>, AppError> {
        match strategy {
            ConflictStrategy::Rename => Ok(Some(self.rename_candidate(target).await?)),
            ConflictStrategy::Overwrite => Ok(Some(target.to_path_buf())),
            ConflictStrategy::Skip => Ok(None),
        }
    }

    /// Timestamp-suffixed alternate filename that does not collide at check
    /// time. A counter is appended if several candidates for the same second
    /// are taken.
    async fn rename_candidate(&self, target: &Path) -> Result<PathBuf, AppError> {
        let parent = target
            .parent()
            .ok_or_else(|| AppError::Validation("Target path has no parent".to_string()))?;
        let stem = target
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| AppError::Validation("Target path has no filename".to_string()))?;
        let extension = target.extension().and_then(|e| e.to_str());

        let timestamp = chrono::Utc::now().timestamp();
        let mut attempt = 0u32;
        loop {
            let name = match (extension, attempt) {
                (Some(ext), 0) => format!("{}_{}.{}", stem, timestamp, ext),
                (Some(ext), n) => format!("{}_{}_{}.{}", stem, timestamp, n, ext),
                (None, 0) => format!("{}_{}", stem, timestamp),
                (None, n) => format!("{}_{}_{}", stem, timestamp, n),
            };
            let candidate = parent.join(name);
            if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(candidate);
            }
            attempt += 1;
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_detect_no_conflict_on_missing_file() {
        let dir = tempdir().unwrap();
        let resolver = ConflictResolver::new();

        let check = resolver.detect(&dir.path().join("missing.jpg")).await.unwrap();
        assert!(!check.has_conflict);
        assert!(check.options.is_empty());
    }

    #[tokio::test]
    async fn test_detect_returns_three_ordered_options() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("photo.jpg");
        tokio::fs::write(&target, b"existing").await.unwrap();

        let resolver = ConflictResolver::new();
        let check = resolver.detect(&target).await.unwrap();

        assert!(check.has_conflict);
        assert_eq!(check.options.len(), 3);
        assert_eq!(check.options[0].strategy, ConflictStrategy::Rename);
        assert_eq!(check.options[1].strategy, ConflictStrategy::Overwrite);
        assert_eq!(check.options[2].strategy, ConflictStrategy::Skip);

        // Rename candidate must not collide with the original
        assert_ne!(check.options[0].resulting_path, target);
        assert!(!check.options[0]
            .resulting_path
            .try_exists()
            .unwrap_or(true));
        assert_eq!(check.options[1].resulting_path, target);
        assert_eq!(check.options[2].resulting_path, PathBuf::new());
    }

    #[tokio::test]
    async fn test_resolve_strategies() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("photo.jpg");
        tokio::fs::write(&target, b"existing").await.unwrap();

        let resolver = ConflictResolver::new();

        let renamed = resolver
            .resolve(&target, ConflictStrategy::Rename)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(renamed, target);
        assert!(renamed
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("photo_"));

        let overwrite = resolver
            .resolve(&target, ConflictStrategy::Overwrite)
            .await
            .unwrap();
        assert_eq!(overwrite, Some(target.clone()));

        let skip = resolver
            .resolve(&target, ConflictStrategy::Skip)
            .await
            .unwrap();
        assert!(skip.is_none());
    }

    #[tokio::test]
    async fn test_rename_candidate_skips_taken_names() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("photo.jpg");
        tokio::fs::write(&target, b"existing").await.unwrap();

        let resolver = ConflictResolver::new();
        let first = resolver
            .resolve(&target, ConflictStrategy::Rename)
            .await
            .unwrap()
            .unwrap();
        tokio::fs::write(&first, b"taken").await.unwrap();

        let second = resolver
            .resolve(&target, ConflictStrategy::Rename)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(second, first);
    }
}
