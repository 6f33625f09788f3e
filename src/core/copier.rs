//! Per-volume copy decision: skip an already-populated destination, otherwise
//! copy the source tree and bump the durable counter.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::core::hardware::VolumeAdapter;
use crate::core::notifications::Notification;
use crate::core::transfer_engine::{TransferEngine, TransferRequest};
use crate::core::verifier::verify_from_hashes;
use crate::core::volume::VolumeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Destination already held files.
    Skipped,
    /// Copy finished; carries the counter value after the increment.
    Succeeded { count: u64 },
    Failed { error: String },
}

/// What the skip check found at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestinationState {
    Populated,
    Empty,
    Missing,
    /// Listing failed; treated as copyable.
    Unknown,
}

pub struct CopyOrchestrator {
    ctx: AppContext,
    adapter: Arc<dyn VolumeAdapter>,
    engine: Arc<dyn TransferEngine>,
}

impl CopyOrchestrator {
    pub fn new(
        ctx: AppContext,
        adapter: Arc<dyn VolumeAdapter>,
        engine: Arc<dyn TransferEngine>,
    ) -> Self {
        Self {
            ctx,
            adapter,
            engine,
        }
    }

    pub fn destination_for(&self, volume: &VolumeId) -> PathBuf {
        self.adapter
            .volume_root(volume)
            .join(&self.ctx.config.destination_folder)
    }

    pub async fn handle(&self, volume: VolumeId) -> CopyOutcome {
        let job_id = Uuid::now_v7().to_string();
        let span = info_span!("copy", volume = %volume, job_id = %job_id);

        self.run(volume, job_id).instrument(span).await
    }

    async fn run(&self, volume: VolumeId, job_id: String) -> CopyOutcome {
        let destination = self.destination_for(&volume);

        match inspect_destination(&destination).await {
            DestinationState::Populated => {
                info!(destination = %destination.display(), "Destination already has files, skipping");
                self.ctx.notifier.send(Notification::skipped(&volume));
                return CopyOutcome::Skipped;
            }
            state => info!(destination = %destination.display(), state = ?state, "Copying to new drive"),
        }

        let req = TransferRequest {
            job_id: job_id.clone(),
            source: self.ctx.config.source_directory.clone(),
            destination: destination.clone(),
        };

        let result = match self.engine.transfer(&req).await {
            Ok(result) => result,
            Err(e) => return self.fail(&volume, format!("{e:#}")),
        };

        if self.ctx.config.verify_copies {
            if let Err(e) = verify_from_hashes(&job_id, &destination, &result.file_hashes).await {
                return self.fail(&volume, format!("{e:#}"));
            }
        }

        let update = self.ctx.counter.increment().await;
        if let Err(e) = &update.persisted {
            error!(count = update.value, error = %e, "Copy succeeded but the counter was not saved");
        }

        info!(
            files = result.files_copied,
            total_bytes = result.total_bytes,
            duration_secs = result.duration_secs,
            count = update.value,
            "Copy complete, safe to eject"
        );
        self.ctx.notifier.send(Notification::succeeded(&volume, update.value));

        CopyOutcome::Succeeded {
            count: update.value,
        }
    }

    fn fail(&self, volume: &VolumeId, error: String) -> CopyOutcome {
        error!(error = %error, "Copy failed");
        self.ctx.notifier.send(Notification::failed(volume, &error));
        CopyOutcome::Failed { error }
    }
}

async fn inspect_destination(destination: &Path) -> DestinationState {
    let mut entries = match tokio::fs::read_dir(destination).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return DestinationState::Missing,
        Err(e) => {
            warn!(destination = %destination.display(), error = %e, "Could not list destination, copying anyway");
            return DestinationState::Unknown;
        }
    };

    match entries.next_entry().await {
        Ok(Some(_)) => DestinationState::Populated,
        Ok(None) => DestinationState::Empty,
        Err(e) => {
            warn!(destination = %destination.display(), error = %e, "Could not list destination, copying anyway");
            DestinationState::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_inspect_destination_states() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("Files");

        assert_eq!(inspect_destination(&dest).await, DestinationState::Missing);

        std::fs::create_dir(&dest).unwrap();
        assert_eq!(inspect_destination(&dest).await, DestinationState::Empty);

        std::fs::write(dest.join("a.txt"), b"a").unwrap();
        assert_eq!(inspect_destination(&dest).await, DestinationState::Populated);
    }

    #[tokio::test]
    async fn test_inspect_destination_file_is_unknown() {
        let temp = tempdir().unwrap();
        let dest = temp.path().join("Files");
        std::fs::write(&dest, b"not a directory").unwrap();

        assert_eq!(inspect_destination(&dest).await, DestinationState::Unknown);
    }
}
