//! Path security validation
//!
//! Provides validation and sanitization for filenames and directory segments:
//! - Filename validation: traversal sequences, reserved/control characters,
//!   trailing dots/whitespace, OS device names, extension allow-list
//! - Segment validation: charset pattern, length, combined path length
//! - Base-directory containment proof for resolved paths
//!
//! The containment check is the primary traversal defense; the filename rules
//! are the first gate that rejects obviously hostile input before any path is
//! built at all.

use std::path::{Component, Path, PathBuf};

use regex::Regex;

use crate::constants::{MAX_FILENAME_LENGTH, MAX_PATH_LENGTH};
use crate::error::AppError;

/// Maximum length for a single directory segment (project code or album name)
pub const MAX_SEGMENT_LENGTH: usize = 64;

/// Characters replaced during sanitization and rejected during validation.
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

/// Outcome of a filename or segment validation.
#[derive(Debug, Clone)]
pub struct FilenameCheck {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl FilenameCheck {
    fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validator for filenames, directory segments, and resolved storage paths.
///
/// Stateless apart from its configuration; construct once at startup and share.
pub struct PathValidator {
    allowed_extensions: Vec<String>,
    device_names: Regex,
    segment_pattern: Regex,
}

impl PathValidator {
    pub fn new(allowed_extensions: Vec<String>) -> Self {
        // Both patterns are fixed; a compile failure is a programming error.
        let device_names = Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])$")
            .expect("device name pattern is valid");
        let segment_pattern =
            Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _\-]*$").expect("segment pattern is valid");
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            device_names,
            segment_pattern,
        }
    }

    /// Validate an uploaded filename against the dangerous-pattern set and the
    /// extension allow-list. Collects every failure rather than stopping at the
    /// first so callers can surface actionable messages.
    pub fn validate_filename(&self, name: &str) -> FilenameCheck {
        let mut errors = Vec::new();

        if name.is_empty() {
            return FilenameCheck::from_errors(vec!["Filename cannot be empty".to_string()]);
        }

        if name.chars().count() > MAX_FILENAME_LENGTH {
            errors.push(format!(
                "Filename exceeds maximum length of {} characters",
                MAX_FILENAME_LENGTH
            ));
        }

        if name.contains("..") {
            errors.push("Filename contains path traversal sequence".to_string());
        }

        if name.chars().any(|c| RESERVED_CHARS.contains(&c)) {
            errors.push("Filename contains reserved characters".to_string());
        }

        if name.chars().any(|c| c.is_control()) {
            errors.push("Filename contains control characters".to_string());
        }

        if name.ends_with('.') || name.ends_with(' ') || name.ends_with('\t') {
            errors.push("Filename cannot end with a dot or whitespace".to_string());
        }

        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        if self.device_names.is_match(stem) {
            errors.push(format!("'{}' is a reserved device name", stem));
        }

        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if extension.is_empty() {
            errors.push("Filename must have an extension".to_string());
        } else if !self.allowed_extensions.contains(&extension) {
            errors.push(format!(
                "Extension '{}' is not allowed. Allowed extensions: {}",
                extension,
                self.allowed_extensions.join(", ")
            ));
        }

        FilenameCheck::from_errors(errors)
    }

    /// Validate the project code and album name that become directory segments.
    pub fn validate_path_segments(&self, project_code: &str, album_name: &str) -> FilenameCheck {
        let mut errors = Vec::new();

        for (label, segment) in [("Project code", project_code), ("Album name", album_name)] {
            if segment.is_empty() {
                errors.push(format!("{} cannot be empty", label));
                continue;
            }
            if segment.chars().count() > MAX_SEGMENT_LENGTH {
                errors.push(format!(
                    "{} exceeds maximum length of {} characters",
                    label, MAX_SEGMENT_LENGTH
                ));
            }
            if segment.contains("..") {
                errors.push(format!("{} contains path traversal sequence", label));
            } else if !self.segment_pattern.is_match(segment) {
                errors.push(format!(
                    "{} contains invalid characters. Allowed: letters, digits, space, underscore, hyphen",
                    label
                ));
            }
            if segment.ends_with('.') || segment.ends_with(' ') {
                errors.push(format!("{} cannot end with a dot or whitespace", label));
            }
        }

        let combined = project_code.chars().count() + album_name.chars().count() + 2;
        if combined > MAX_PATH_LENGTH {
            errors.push(format!(
                "Combined path exceeds maximum length of {} characters",
                MAX_PATH_LENGTH
            ));
        }

        FilenameCheck::from_errors(errors)
    }

    /// Sanitize a filename so it is safe to store.
    ///
    /// Replaces every dangerous character with an underscore, strips trailing
    /// dots and whitespace, and truncates to the maximum length. Deterministic
    /// and idempotent on already-safe input; a timestamp suffix is appended only
    /// when sanitization leaves nothing usable.
    pub fn sanitize_filename(&self, name: &str) -> String {
        // Drop any directory part the client smuggled in.
        let name_only = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name);

        let mut sanitized: String = name_only
            .chars()
            .take(MAX_FILENAME_LENGTH)
            .map(|c| {
                if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        // Whitespace is already mapped to '_' above; only trailing dots remain.
        sanitized = sanitized.trim_end_matches('.').to_string();

        // ".." survives the charset filter; collapse it.
        while sanitized.contains("..") {
            sanitized = sanitized.replace("..", "_.");
        }

        if sanitized.chars().all(|c| c == '_' || c == '.') {
            return format!("file_{}", chrono::Utc::now().timestamp());
        }

        sanitized
    }

    /// Prove that `segments` joined under `base` stay inside `base`.
    ///
    /// Every segment must be a single normal path component; the joined path is
    /// then checked against the canonicalized base as a second line of defense
    /// against traversal that slips past the character rules.
    pub fn resolve_within_base(
        &self,
        base: &Path,
        segments: &[&str],
    ) -> Result<PathBuf, AppError> {
        let mut path = base.to_path_buf();

        for segment in segments {
            if segment.is_empty() {
                return Err(AppError::Validation(
                    "Path segment cannot be empty".to_string(),
                ));
            }
            let candidate = Path::new(segment);
            let mut components = candidate.components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => {}
                _ => {
                    return Err(AppError::Validation(format!(
                        "Path segment '{}' is not a plain name",
                        segment
                    )));
                }
            }
            if segment.contains("..") {
                return Err(AppError::Validation(format!(
                    "Path segment '{}' contains traversal sequence",
                    segment
                )));
            }
            path.push(segment);
        }

        let relative_len: usize = segments.iter().map(|s| s.chars().count() + 1).sum();
        if relative_len > MAX_PATH_LENGTH {
            return Err(AppError::Validation(format!(
                "Resolved path exceeds maximum length of {} characters",
                MAX_PATH_LENGTH
            )));
        }

        // Prefix check against the canonical base. The path itself may not exist
        // yet, so canonicalize the nearest existing ancestor instead.
        if let Ok(base_canonical) = base.canonicalize() {
            let mut probe = path.clone();
            let mut suffix = Vec::new();
            loop {
                match probe.canonicalize() {
                    Ok(canonical) => {
                        let mut resolved = canonical;
                        for part in suffix.iter().rev() {
                            resolved.push(part);
                        }
                        if resolved.strip_prefix(&base_canonical).is_err() {
                            return Err(AppError::Validation(
                                "Resolved path escapes the storage base directory".to_string(),
                            ));
                        }
                        break;
                    }
                    Err(_) => {
                        let name = probe.file_name().map(|n| n.to_owned());
                        let parent = probe.parent().map(|p| p.to_path_buf());
                        match (name, parent) {
                            (Some(name), Some(parent)) => {
                                suffix.push(name);
                                probe = parent;
                            }
                            _ => break,
                        }
                    }
                }
            }
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> PathValidator {
        PathValidator::new(vec![
            "jpg".to_string(),
            "png".to_string(),
            "pdf".to_string(),
        ])
    }

    #[test]
    fn test_validate_filename_accepts_safe_names() {
        let v = validator();
        assert!(v.validate_filename("site-photo_001.jpg").valid);
        assert!(v.validate_filename("Bauplan.Rev2.pdf").valid);
    }

    #[test]
    fn test_validate_filename_rejects_traversal() {
        let v = validator();
        let check = v.validate_filename("../../etc/passwd");
        assert!(!check.valid);
        assert!(check
            .errors
            .iter()
            .any(|e| e.contains("traversal")));
    }

    #[test]
    fn test_validate_filename_rejects_separators_and_control_chars() {
        let v = validator();
        assert!(!v.validate_filename("a/b.jpg").valid);
        assert!(!v.validate_filename("a\\b.jpg").valid);
        assert!(!v.validate_filename("a\u{0}b.jpg").valid);
    }

    #[test]
    fn test_validate_filename_rejects_device_names() {
        let v = validator();
        assert!(!v.validate_filename("CON.jpg").valid);
        assert!(!v.validate_filename("com1.png").valid);
        assert!(!v.validate_filename("LpT9.pdf").valid);
        // Not a device name, just a prefix match
        assert!(v.validate_filename("CONSTRUCTION.jpg").valid);
    }

    #[test]
    fn test_validate_filename_rejects_trailing_dot_and_unknown_extension() {
        let v = validator();
        assert!(!v.validate_filename("photo.jpg.").valid);
        assert!(!v.validate_filename("photo.jpg ").valid);
        assert!(!v.validate_filename("script.exe").valid);
        assert!(!v.validate_filename("noextension").valid);
    }

    #[test]
    fn test_validate_filename_rejects_overlong() {
        let v = validator();
        let long = format!("{}.jpg", "a".repeat(MAX_FILENAME_LENGTH));
        assert!(!v.validate_filename(&long).valid);
    }

    #[test]
    fn test_validate_path_segments() {
        let v = validator();
        assert!(v.validate_path_segments("P1", "Fundament Nord").valid);
        assert!(!v.validate_path_segments("", "album").valid);
        assert!(!v.validate_path_segments("..", "album").valid);
        assert!(!v.validate_path_segments("P1", "a/b").valid);
        assert!(!v.validate_path_segments(".hidden", "album").valid);
    }

    #[test]
    fn test_sanitize_replaces_dangerous_characters() {
        let v = validator();
        assert_eq!(v.sanitize_filename("a b?.jpg"), "a_b_.jpg");
        assert_eq!(v.sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(v.sanitize_filename("photo.jpg..."), "photo.jpg");
    }

    #[test]
    fn test_sanitize_is_idempotent_on_safe_input() {
        let v = validator();
        for name in ["site-photo_001.jpg", "a_b_.jpg", "Bauplan.Rev2.pdf"] {
            let once = v.sanitize_filename(name);
            let twice = v.sanitize_filename(&once);
            assert_eq!(once, twice, "sanitize not idempotent for {}", name);
        }
    }

    #[test]
    fn test_sanitize_empty_result_gets_unique_suffix() {
        let v = validator();
        let sanitized = v.sanitize_filename("???");
        assert!(sanitized.starts_with("file_"), "got {}", sanitized);
    }

    #[test]
    fn test_resolve_within_base_accepts_plain_segments() {
        let v = validator();
        let dir = tempfile::tempdir().unwrap();
        let path = v
            .resolve_within_base(dir.path(), &["P1", "A1", "photo.jpg"])
            .unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path.ends_with("P1/A1/photo.jpg"));
    }

    #[test]
    fn test_resolve_within_base_rejects_traversal_segments() {
        let v = validator();
        let dir = tempfile::tempdir().unwrap();
        assert!(v
            .resolve_within_base(dir.path(), &["..", "A1", "photo.jpg"])
            .is_err());
        assert!(v
            .resolve_within_base(dir.path(), &["P1", "a/b", "photo.jpg"])
            .is_err());
        assert!(v
            .resolve_within_base(dir.path(), &["/etc", "A1", "photo.jpg"])
            .is_err());
    }
}
