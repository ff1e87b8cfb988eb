//! Quota and system-resource views. Both are derived on demand and never
//! persisted independently.

use serde::Serialize;

/// Storage usage against a configured ceiling.
/// Invariant: `remaining == total_limit - total_used`, never negative.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuotaInfo {
    pub total_used: u64,
    pub total_limit: u64,
    pub remaining: u64,
    pub usage_percentage: f64,
}

impl QuotaInfo {
    pub fn new(total_used: u64, total_limit: u64) -> Self {
        let remaining = total_limit.saturating_sub(total_used);
        let usage_percentage = if total_limit == 0 {
            100.0
        } else {
            (total_used as f64 / total_limit as f64) * 100.0
        };
        Self {
            total_used,
            total_limit,
            remaining,
            usage_percentage,
        }
    }

    /// Whether an additional write of `bytes` fits under the ceiling.
    pub fn admits(&self, bytes: u64) -> bool {
        bytes <= self.remaining
    }
}

/// Snapshot of host resources relevant to accepting new uploads.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub disk_available_bytes: u64,
    pub memory_available_bytes: u64,
    pub memory_total_bytes: u64,
    /// False when disk headroom is below the configured minimum.
    pub healthy: bool,
}
