//! Sitevault Storage
//!
//! Local filesystem storage for construction-project photos and documents.
//! Files live under a single configured base directory, subdivided by project
//! code, then album name, then filename. All path-bearing operations prove
//! containment in the base directory before touching the filesystem.

pub mod conflict;
pub mod local;
pub mod paths;
pub mod resources;

pub use conflict::ConflictResolver;
pub use local::{LocalFileStore, UploadOptions};
