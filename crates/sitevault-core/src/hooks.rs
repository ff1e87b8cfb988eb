//! Hooks for the excluded metadata layer
//!
//! The storage core persists bytes only; photo metadata lives in the excluded
//! database layer. These traits let that layer observe storage changes without
//! this crate depending on it.

use async_trait::async_trait;

/// Trait for reporting storage usage changes to the metadata layer.
///
/// The core calls these methods after byte-level changes. The consuming layer
/// implements this trait to keep its usage figures current.
#[async_trait]
pub trait UsageReporter: Send + Sync {
    /// Report a change in stored bytes for a project (positive on upload,
    /// negative on delete).
    async fn report_storage_change(&self, project_code: &str, bytes_delta: i64)
        -> Result<(), String>;
}

/// No-op implementation for when no metadata layer is attached.
pub struct NoOpUsageReporter;

#[async_trait]
impl UsageReporter for NoOpUsageReporter {
    async fn report_storage_change(
        &self,
        _project_code: &str,
        _bytes_delta: i64,
    ) -> Result<(), String> {
        Ok(())
    }
}
