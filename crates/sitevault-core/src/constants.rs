//! Shared constants for the storage core.

/// Maximum length for an uploaded filename (characters)
pub const MAX_FILENAME_LENGTH: usize = 100;

/// Maximum length for a full storage path relative to the base directory (characters)
pub const MAX_PATH_LENGTH: usize = 255;

/// Default chunk size for large-file uploads (1 MiB)
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 1024 * 1024;

/// Number of window violations before a key is temporarily blocked
pub const RATE_LIMIT_VIOLATION_THRESHOLD: u32 = 3;
