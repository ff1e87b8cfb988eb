//! Conflict resolution types for writes whose target already exists.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Strategy for resolving a name collision at the write target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Write under a timestamp-suffixed alternate name.
    Rename,
    /// Replace the existing file. Destructive.
    Overwrite,
    /// Do not write at all.
    Skip,
}

/// One resolution the caller may choose. Ephemeral, produced per conflict check.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictOption {
    pub strategy: ConflictStrategy,
    /// Path the write would land at; empty for `Skip`.
    pub resulting_path: PathBuf,
    pub description: String,
}

/// Result of a conflict check against a target path.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictCheck {
    pub has_conflict: bool,
    pub options: Vec<ConflictOption>,
}

impl ConflictCheck {
    pub fn clear() -> Self {
        Self {
            has_conflict: false,
            options: Vec::new(),
        }
    }
}
