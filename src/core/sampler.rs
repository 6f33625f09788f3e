use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::core::hardware::{MountEntry, VolumeAdapter};
use crate::core::volume::{VolumeId, VolumeSet};

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("volume enumeration failed: {0}")]
    Enumeration(String),
    #[error("volume enumeration task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Turns raw mount listings into a filtered set of candidate volumes.
#[derive(Clone)]
pub struct VolumeSampler {
    adapter: Arc<dyn VolumeAdapter>,
    excluded: Arc<BTreeSet<VolumeId>>,
}

impl VolumeSampler {
    pub fn new(adapter: Arc<dyn VolumeAdapter>, excluded: BTreeSet<VolumeId>) -> Self {
        Self {
            adapter,
            excluded: Arc::new(excluded),
        }
    }

    pub async fn sample(&self) -> Result<VolumeSet, SampleError> {
        let adapter = self.adapter.clone();
        let mounts = tokio::task::spawn_blocking(move || adapter.list_mounts())
            .await?
            .map_err(|e| SampleError::Enumeration(format!("{e:#}")))?;

        Ok(filter_mounts(&mounts, &self.excluded))
    }
}

/// Keep drive-shaped identifiers that are not excluded.
pub fn filter_mounts(mounts: &[MountEntry], excluded: &BTreeSet<VolumeId>) -> VolumeSet {
    mounts
        .iter()
        .filter_map(|mount| match VolumeId::parse(&mount.mount_point) {
            Ok(id) if excluded.contains(&id) => {
                trace!(volume = %id, "Ignoring excluded volume");
                None
            }
            Ok(id) => {
                trace!(volume = %id, label = %mount.label, removable = mount.removable, "Candidate volume");
                Some(id)
            }
            Err(_) => None,
        })
        .collect()
}
