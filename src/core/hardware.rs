use std::path::PathBuf;

use crate::core::volume::VolumeId;

/// A single mounted filesystem as reported by the OS.
#[derive(Debug, Clone)]
pub struct MountEntry {
    pub mount_point: String,
    pub label: String,
    pub removable: bool,
}

pub trait VolumeAdapter: Send + Sync {
    /// List all currently visible filesystem mounts.
    /// NOTE: This may perform blocking I/O and should be called from a blocking
    /// context (e.g., via spawn_blocking).
    fn list_mounts(&self) -> anyhow::Result<Vec<MountEntry>>;

    /// Root directory on the host for a volume identifier.
    fn volume_root(&self, volume: &VolumeId) -> PathBuf {
        volume.root()
    }
}
