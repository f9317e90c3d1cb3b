//! Free-space queries and disk-space admission control.

use std::path::Path;

use sysinfo::Disks;

/// Reports free space on the volume holding a path.
pub trait DiskSpaceProvider: Send + Sync {
    /// Available bytes, or `None` if it cannot be determined.
    fn available_space(&self, path: &Path) -> Option<u64>;
}

/// Queries the operating system through `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDiskSpace;

impl DiskSpaceProvider for SystemDiskSpace {
    fn available_space(&self, path: &Path) -> Option<u64> {
        let disks = Disks::new_with_refreshed_list();
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        // The disk with the longest mount point containing the path is the
        // one it lives on.
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskSpaceStatus {
    Ok {
        available_bytes: u64,
    },
    InsufficientSpace {
        available_bytes: u64,
        required_bytes: u64,
    },
    /// No estimate was available, so nothing was checked.
    Skipped,
    /// Free space could not be determined.
    Unknown,
}

impl DiskSpaceStatus {
    /// Only a confirmed shortfall blocks an export.
    pub fn admits(&self) -> bool {
        !matches!(self, Self::InsufficientSpace { .. })
    }
}

/// Compare free space at `path` with `required_bytes`.
///
/// A zero requirement means the size could not be estimated; the check is
/// skipped rather than blocking the export. Unknown free space also admits.
pub fn check_admission(
    provider: &dyn DiskSpaceProvider,
    path: &Path,
    required_bytes: u64,
) -> DiskSpaceStatus {
    if required_bytes == 0 {
        tracing::debug!("No output size estimate; skipping disk space check");
        return DiskSpaceStatus::Skipped;
    }

    match provider.available_space(path) {
        Some(available_bytes) if available_bytes < required_bytes => {
            tracing::warn!(
                "Insufficient disk space at {}: {} bytes available, {} bytes required",
                path.display(),
                available_bytes,
                required_bytes
            );
            DiskSpaceStatus::InsufficientSpace {
                available_bytes,
                required_bytes,
            }
        }
        Some(available_bytes) => {
            tracing::debug!(
                "Disk space OK: {} bytes available, {} bytes required",
                available_bytes,
                required_bytes
            );
            DiskSpaceStatus::Ok { available_bytes }
        }
        None => {
            tracing::warn!("Could not determine disk space for {}", path.display());
            DiskSpaceStatus::Unknown
        }
    }
}
