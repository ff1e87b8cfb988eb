//! Validation modules

pub mod path;

pub use path::{FilenameCheck, PathValidator};
