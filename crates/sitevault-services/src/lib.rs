//! Sitevault Services
//!
//! Service layer composing the storage core: the integrated upload pre-flight
//! validation that the web layer calls before performing an actual write.

pub mod upload;

pub use upload::{UploadRequest, UploadValidator, ValidationReport};
