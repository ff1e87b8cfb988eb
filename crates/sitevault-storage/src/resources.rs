//! Host resource introspection for upload admission.
//!
//! Disk and memory figures come from `sysinfo`. The checks are synchronous and
//! should be called through `spawn_blocking` from async contexts.

use std::path::{Path, PathBuf};

use sysinfo::{Disks, System};

use sitevault_core::error::AppError;
use sitevault_core::models::ResourceStatus;

/// Available bytes on the disk holding `path`. Picks the disk with the longest
/// mount-point prefix of the canonicalized path.
pub fn disk_available(path: &Path) -> Result<u64, AppError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| AppError::Disk(format!("Failed to canonicalize {}: {}", path.display(), e)))?;

    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| canonical.starts_with(PathBuf::from(disk.mount_point())))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
        .ok_or_else(|| {
            AppError::Disk(format!(
                "Could not determine disk space for path: {}",
                path.display()
            ))
        })
}

/// Snapshot of disk and memory state relevant to accepting new uploads.
pub fn resource_status(base_dir: &Path, min_disk_free_bytes: u64) -> Result<ResourceStatus, AppError> {
    let disk_available_bytes = disk_available(base_dir)?;

    let mut system = System::new();
    system.refresh_memory();
    let memory_total_bytes = system.total_memory();
    let memory_available_bytes = memory_total_bytes.saturating_sub(system.used_memory());

    Ok(ResourceStatus {
        disk_available_bytes,
        memory_available_bytes,
        memory_total_bytes,
        healthy: disk_available_bytes >= min_disk_free_bytes,
    })
}

/// Reject a write of `required_bytes` that would eat into the configured
/// free-space headroom.
pub fn check_disk_headroom(
    base_dir: &Path,
    required_bytes: u64,
    min_disk_free_bytes: u64,
) -> Result<(), AppError> {
    let available = disk_available(base_dir)?;
    let total_required = required_bytes.saturating_add(min_disk_free_bytes);

    if available < total_required {
        tracing::warn!(
            available_bytes = available,
            required_bytes = total_required,
            path = %base_dir.display(),
            "Insufficient disk space"
        );
        return Err(AppError::InsufficientDiskSpace {
            available,
            required: total_required,
        });
    }

    Ok(())
}
