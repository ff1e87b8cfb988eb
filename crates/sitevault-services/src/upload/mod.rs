//! Integrated upload validation
//!
//! Composes path security, quota, rate limiting, and conflict detection into
//! one pre-flight decision: can this upload proceed, and where should it land.

pub mod signature;
pub mod types;

mod service;

pub use service::UploadValidator;
pub use types::{QuotaStage, SecurityStage, UploadRequest, ValidationReport};
