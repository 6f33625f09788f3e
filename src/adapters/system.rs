use crate::core::hardware::{MountEntry, VolumeAdapter};
use sysinfo::Disks;
use tracing::trace;

/// Mount enumeration backed by the OS disk list.
#[derive(Default)]
pub struct SysinfoAdapter;

impl VolumeAdapter for SysinfoAdapter {
    fn list_mounts(&self) -> anyhow::Result<Vec<MountEntry>> {
        let disks = Disks::new_with_refreshed_list();

        let mounts = disks
            .list()
            .iter()
            .map(|disk| MountEntry {
                mount_point: disk.mount_point().to_string_lossy().to_string(),
                label: disk.name().to_string_lossy().to_string(),
                removable: disk.is_removable(),
            })
            .collect::<Vec<_>>();

        trace!(count = mounts.len(), "Enumerated mounts");
        Ok(mounts)
    }
}
