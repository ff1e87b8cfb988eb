//! Domain models shared across sitevault components.

pub mod conflict;
pub mod file;
pub mod quota;

pub use conflict::{ConflictCheck, ConflictOption, ConflictStrategy};
pub use file::{BatchFailure, BatchOutcome, DeleteMode, DirectoryRecord, FileRecord, UploadProgress};
pub use quota::{QuotaInfo, ResourceStatus};
