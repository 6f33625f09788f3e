use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, bail};

use crate::core::hardware::{MountEntry, VolumeAdapter};
use crate::core::volume::VolumeId;

#[derive(Default)]
struct SimulatedState {
    mounts: BTreeMap<String, MountEntry>,
    failures_pending: u32,
}

type SharedState = Arc<Mutex<SimulatedState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SimulatedState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Controller for a [`SimulatedAdapter`]. Drive-shaped volumes get a real
/// directory under the simulation root so copies can land somewhere.
#[derive(Clone)]
pub struct Simulator {
    root: PathBuf,
    state: SharedState,
}

impl Simulator {
    /// Mount a volume. `mount_point` is reported verbatim, so non-drive
    /// mounts like `/media/usb` can be simulated too.
    pub fn add_volume(&self, mount_point: &str) -> Result<Option<PathBuf>> {
        let root = match VolumeId::parse(mount_point) {
            Ok(id) => {
                let root = simulated_root(&self.root, &id);
                std::fs::create_dir_all(&root)
                    .with_context(|| format!("Failed to create {}", root.display()))?;
                Some(root)
            }
            Err(_) => None,
        };

        let entry = MountEntry {
            mount_point: mount_point.to_string(),
            label: format!("SIM_{}", VolumeId::normalize(mount_point)),
            removable: true,
        };
        lock(&self.state)
            .mounts
            .insert(mount_point.to_string(), entry);

        Ok(root)
    }

    /// Unmount a volume. Its directory is kept, like a real drive's contents.
    pub fn remove_volume(&self, mount_point: &str) {
        let normalized = VolumeId::normalize(mount_point);
        lock(&self.state)
            .mounts
            .retain(|key, _| VolumeId::normalize(key) != normalized);
    }

    /// Make the next listing fail.
    pub fn fail_next_listing(&self) {
        lock(&self.state).failures_pending += 1;
    }
}

/// Volume adapter whose mounts are driven by a [`Simulator`].
pub struct SimulatedAdapter {
    root: PathBuf,
    state: SharedState,
}

impl SimulatedAdapter {
    pub fn new(root: impl AsRef<Path>) -> (Self, Simulator) {
        let root = root.as_ref().to_path_buf();
        let state = SharedState::default();

        (
            Self {
                root: root.clone(),
                state: state.clone(),
            },
            Simulator { root, state },
        )
    }
}

impl VolumeAdapter for SimulatedAdapter {
    fn list_mounts(&self) -> Result<Vec<MountEntry>> {
        let mut state = lock(&self.state);
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            bail!("simulated enumeration failure");
        }
        Ok(state.mounts.values().cloned().collect())
    }

    fn volume_root(&self, volume: &VolumeId) -> PathBuf {
        simulated_root(&self.root, volume)
    }
}

fn simulated_root(root: &Path, volume: &VolumeId) -> PathBuf {
    root.join(volume.letter().to_string())
}
