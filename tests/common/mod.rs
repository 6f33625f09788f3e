#![allow(dead_code)]

use async_trait::async_trait;
use driveseed::adapters::{SimulatedAdapter, Simulator};
use driveseed::config::AppConfig;
use driveseed::context::AppContext;
use driveseed::core::{
    CounterStore, Notification, NotificationChannel, NotificationKind, Notifier,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Channel that keeps every notification for inspection.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingChannel {
    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent.lock().unwrap().iter().map(|n| n.kind).collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

pub struct Harness {
    pub temp: TempDir,
    pub source: PathBuf,
    pub counter_path: PathBuf,
    pub adapter: Arc<SimulatedAdapter>,
    pub simulator: Simulator,
    pub notifications: Arc<RecordingChannel>,
    pub ctx: AppContext,
}

impl Harness {
    /// Kinds of every notification sent so far, once pending deliveries finish.
    pub async fn notified(&self) -> Vec<NotificationKind> {
        self.ctx.notifier.flush().await;
        self.notifications.kinds()
    }

    pub async fn notified_count(&self, kind: NotificationKind) -> usize {
        self.ctx.notifier.flush().await;
        self.notifications.count(kind)
    }
}

pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Source folder with the given files, a simulated drive root, and a
/// recording notifier. `C:` is excluded.
pub fn harness(source_files: &[(&str, &[u8])]) -> Harness {
    harness_with(source_files, |_| {})
}

pub fn harness_with(source_files: &[(&str, &[u8])], tweak: impl FnOnce(&mut AppConfig)) -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let source = temp.path().join("source");
    std::fs::create_dir_all(&source).unwrap();
    for (name, content) in source_files {
        write_file(&source.join(name), content);
    }

    let counter_path = temp.path().join("copy_count.txt");
    let mut config = AppConfig {
        source_directory: source.clone(),
        counter_file: Some(counter_path.clone()),
        sync_files: false,
        excluded_volumes: vec!["C:".to_string()],
        ..Default::default()
    };
    tweak(&mut config);

    let (adapter, simulator) = SimulatedAdapter::new(temp.path().join("drives"));
    let notifications = Arc::new(RecordingChannel::default());
    let ctx = AppContext::with_parts(
        config,
        CounterStore::new(&counter_path),
        Notifier::new(Some(notifications.clone())),
    );

    Harness {
        temp,
        source,
        counter_path,
        adapter: Arc::new(adapter),
        simulator,
        notifications,
        ctx,
    }
}

pub fn persisted_count(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}
