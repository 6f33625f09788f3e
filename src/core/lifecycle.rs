use crate::core::volume::{VolumeId, VolumeSet};

/// Insertions and removals between two successive snapshots.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VolumeChanges {
    pub inserted: Vec<VolumeId>,
    pub removed: Vec<VolumeId>,
}

pub fn diff(previous: &VolumeSet, current: &VolumeSet) -> VolumeChanges {
    VolumeChanges {
        inserted: current.difference(previous).cloned().collect(),
        removed: previous.difference(current).cloned().collect(),
    }
}
