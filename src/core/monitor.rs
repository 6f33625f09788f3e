use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::context::AppContext;
use crate::core::copier::{CopyOrchestrator, CopyOutcome};
use crate::core::hardware::VolumeAdapter;
use crate::core::lifecycle;
use crate::core::notifications::Notification;
use crate::core::sampler::VolumeSampler;
use crate::core::transfer_engine::TransferEngine;
use crate::core::volume::{VolumeId, VolumeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Initializing,
    Monitoring,
}

/// What a single poll saw and dispatched.
#[derive(Debug, Default)]
pub struct TickReport {
    pub inserted: Vec<VolumeId>,
    pub removed: Vec<VolumeId>,
    /// One detached copy task per inserted volume
    pub copies: Vec<(VolumeId, JoinHandle<CopyOutcome>)>,
    pub sample_failed: bool,
}

impl TickReport {
    /// Wait for every copy dispatched on this tick. A copy task that
    /// panicked or was cancelled is logged and reported as failed.
    pub async fn join_copies(self) -> Vec<(VolumeId, CopyOutcome)> {
        let mut outcomes = Vec::with_capacity(self.copies.len());
        for (volume, handle) in self.copies {
            let outcome = handle.await.unwrap_or_else(|e| {
                error!(volume = %volume, error = %e, "Copy task aborted");
                CopyOutcome::Failed {
                    error: format!("copy task aborted: {}", e),
                }
            });
            outcomes.push((volume, outcome));
        }
        outcomes
    }

    /// Let the copies run on without waiting for them. Aborted tasks are
    /// still logged.
    pub fn detach(self) -> JoinHandle<Vec<(VolumeId, CopyOutcome)>> {
        tokio::spawn(self.join_copies())
    }
}

/// Polls for volumes and dispatches a copy for each new one.
pub struct Monitor {
    ctx: AppContext,
    sampler: VolumeSampler,
    copier: Arc<CopyOrchestrator>,
    attached: VolumeSet,
    state: MonitorState,
}

impl Monitor {
    pub fn new(
        ctx: AppContext,
        adapter: Arc<dyn VolumeAdapter>,
        engine: Arc<dyn TransferEngine>,
    ) -> Result<Self> {
        let excluded = ctx.config.excluded_volume_ids()?;
        let sampler = VolumeSampler::new(adapter.clone(), excluded);
        let copier = Arc::new(CopyOrchestrator::new(ctx.clone(), adapter, engine));

        Ok(Self {
            ctx,
            sampler,
            copier,
            attached: VolumeSet::new(),
            state: MonitorState::Initializing,
        })
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn attached(&self) -> &VolumeSet {
        &self.attached
    }

    /// Check the source, load the counter and record the volumes that are
    /// already attached. Pre-existing volumes do not get a copy.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.state == MonitorState::Monitoring {
            return Ok(());
        }

        let source = self.ctx.config.source_directory.clone();
        let source_ok = tokio::fs::metadata(&source)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !source_ok {
            let msg = format!("Source folder {} does not exist", source.display());
            error!("{}", msg);
            self.ctx.notifier.send(Notification::startup_failed(&msg));
            bail!(msg);
        }

        let count = self.ctx.counter.load().await;

        self.attached = match self.sampler.sample().await {
            Ok(set) => set,
            Err(e) => {
                error!(error = %e, "Initial volume scan failed, starting with no known volumes");
                self.ctx.notifier.send(Notification::enumeration_failed(&e.to_string()));
                VolumeSet::new()
            }
        };

        self.state = MonitorState::Monitoring;

        info!(
            source = %source.display(),
            count,
            attached = ?self.attached.iter().map(VolumeId::as_str).collect::<Vec<_>>(),
            "Monitoring for new drives"
        );
        self.ctx.notifier.send(Notification::ready(count));

        Ok(())
    }

    /// Sample once, update the attached set and dispatch copies.
    ///
    /// On a sampling failure the attached set is left as it was.
    pub async fn tick(&mut self) -> TickReport {
        let current = match self.sampler.sample().await {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "Volume scan failed, keeping last known drives");
                self.ctx.notifier.send(Notification::enumeration_failed(&e.to_string()));
                return TickReport {
                    sample_failed: true,
                    ..Default::default()
                };
            }
        };

        let changes = lifecycle::diff(&self.attached, &current);
        self.attached = current;

        for volume in &changes.removed {
            info!(volume = %volume, "Drive removed");
        }

        let copies = changes
            .inserted
            .iter()
            .map(|volume| {
                info!(volume = %volume, "Drive inserted");
                let copier = self.copier.clone();
                let target = volume.clone();
                let handle = tokio::spawn(async move { copier.handle(target).await });
                (volume.clone(), handle)
            })
            .collect();

        TickReport {
            inserted: changes.inserted,
            removed: changes.removed,
            copies,
            sample_failed: false,
        }
    }

    /// Initialize, then poll until `shutdown` is cancelled. Copies already
    /// running are left to finish on their own.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        self.initialize().await?;

        let mut interval =
            tokio::time::interval(Duration::from_millis(self.ctx.config.poll_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; initialize already sampled.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await.detach();
                }
                _ = shutdown.cancelled() => {
                    info!("Monitor shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
