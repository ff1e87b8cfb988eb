//! Shared storage path construction.
//!
//! Path format: `<base>/<project_code>/<album_name>/<filename>`. All components
//! go through the path validator so a path can only be built from segments that
//! were proven to stay inside the base directory.

use std::path::{Path, PathBuf};

use sitevault_core::error::AppError;
use sitevault_core::validation::PathValidator;

/// Resolve the directory for a project/album pair.
pub fn album_dir(
    validator: &PathValidator,
    base: &Path,
    project_code: &str,
    album_name: &str,
) -> Result<PathBuf, AppError> {
    let check = validator.validate_path_segments(project_code, album_name);
    if !check.valid {
        return Err(AppError::Validation(check.errors.join("; ")));
    }
    validator.resolve_within_base(base, &[project_code, album_name])
}

/// Resolve the full storage path for a file. `filename` must already be
/// sanitized; it is still validated as a single path component.
pub fn file_path(
    validator: &PathValidator,
    base: &Path,
    project_code: &str,
    album_name: &str,
    filename: &str,
) -> Result<PathBuf, AppError> {
    let check = validator.validate_path_segments(project_code, album_name);
    if !check.valid {
        return Err(AppError::Validation(check.errors.join("; ")));
    }
    validator.resolve_within_base(base, &[project_code, album_name, filename])
}

/// MIME type for a stored file, derived from its extension.
/// Mirrors the upload allow-list; anything unknown is served as octet-stream.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> PathValidator {
        PathValidator::new(vec!["jpg".to_string(), "pdf".to_string()])
    }

    #[test]
    fn test_file_path_layout() {
        let v = validator();
        let dir = tempfile::tempdir().unwrap();
        let path = file_path(&v, dir.path(), "P1", "A1", "photo.jpg").unwrap();
        assert_eq!(path, dir.path().join("P1").join("A1").join("photo.jpg"));
    }

    #[test]
    fn test_file_path_rejects_bad_segments() {
        let v = validator();
        let dir = tempfile::tempdir().unwrap();
        assert!(file_path(&v, dir.path(), "../P1", "A1", "photo.jpg").is_err());
        assert!(file_path(&v, dir.path(), "P1", "A1", "../photo.jpg").is_err());
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("JPG"), "image/jpeg");
        assert_eq!(mime_for_extension("weird"), "application/octet-stream");
    }
}
