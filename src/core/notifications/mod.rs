mod desktop;
mod slack;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{NotificationChannelType, NotificationConfig};
use crate::core::volume::VolumeId;

pub use desktop::DesktopNotifier;
pub use slack::SlackNotifier;

/// Upper bound on a single delivery attempt
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Ready,
    Skipped,
    Succeeded,
    Failed,
    EnumerationFailed,
    StartupFailed,
}

/// A message for the operator.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub urgent: bool,
}

impl Notification {
    pub fn ready(count: u64) -> Self {
        Self {
            kind: NotificationKind::Ready,
            title: "Drive Seeder Ready".to_string(),
            message: format!("Waiting for drives. {} copies so far.", count),
            urgent: false,
        }
    }

    pub fn skipped(volume: &VolumeId) -> Self {
        Self {
            kind: NotificationKind::Skipped,
            title: "Copy Skipped".to_string(),
            message: format!("{} already has files. Nothing copied.", volume),
            urgent: false,
        }
    }

    pub fn succeeded(volume: &VolumeId, count: u64) -> Self {
        Self {
            kind: NotificationKind::Succeeded,
            title: "Copy Complete".to_string(),
            message: format!("{} is safe to eject. Total copies: {}.", volume, count),
            urgent: false,
        }
    }

    pub fn failed(volume: &VolumeId, error: &str) -> Self {
        Self {
            kind: NotificationKind::Failed,
            title: "Copy Failed".to_string(),
            message: format!("Copy to {} failed: {}", volume, error),
            urgent: true,
        }
    }

    pub fn enumeration_failed(error: &str) -> Self {
        Self {
            kind: NotificationKind::EnumerationFailed,
            title: "Drive Detection Error".to_string(),
            message: format!("Could not list drives: {}", error),
            urgent: true,
        }
    }

    pub fn startup_failed(error: &str) -> Self {
        Self {
            kind: NotificationKind::StartupFailed,
            title: "Drive Seeder Not Started".to_string(),
            message: error.to_string(),
            urgent: true,
        }
    }
}

/// Trait for notification channel implementations (desktop, Slack, etc.)
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Writes notifications to the log only.
pub struct LogNotifier;

#[async_trait]
impl NotificationChannel for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        info!(
            kind = ?notification.kind,
            urgent = notification.urgent,
            "{}: {}",
            notification.title,
            notification.message
        );
        Ok(())
    }
}

/// Factory function to create a channel based on config
pub fn create_channel(config: &NotificationConfig) -> Option<Arc<dyn NotificationChannel>> {
    match &config.channel {
        NotificationChannelType::None => None,
        NotificationChannelType::Log => Some(Arc::new(LogNotifier)),
        NotificationChannelType::Desktop => Some(Arc::new(DesktopNotifier::default())),
        NotificationChannelType::Slack => {
            let webhook = config.slack_webhook.as_ref()?;
            if webhook.is_empty() {
                warn!("Slack notifications selected but no webhook configured");
                return None;
            }
            Some(Arc::new(SlackNotifier::new(webhook.clone())))
        }
    }
}

/// Best-effort delivery front for a notification channel.
///
/// Each notification is delivered on its own task, so callers never wait on
/// the channel. Delivery failures and timeouts are logged and otherwise ignored.
#[derive(Clone)]
pub struct Notifier {
    channel: Option<Arc<dyn NotificationChannel>>,
    pending: TaskTracker,
}

impl Notifier {
    pub fn new(channel: Option<Arc<dyn NotificationChannel>>) -> Self {
        Self {
            channel,
            pending: TaskTracker::new(),
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(create_channel(config))
    }

    /// Queue a notification and return immediately. Must be called from
    /// within a tokio runtime.
    pub fn send(&self, notification: Notification) {
        let Some(channel) = self.channel.clone() else {
            return;
        };
        self.pending.spawn(deliver(channel, notification));
    }

    /// Wait until every notification sent so far has been delivered or has
    /// timed out.
    pub async fn flush(&self) {
        self.pending.close();
        self.pending.wait().await;
    }
}

async fn deliver(channel: Arc<dyn NotificationChannel>, notification: Notification) {
    let kind = notification.kind;
    match tokio::time::timeout(DELIVERY_TIMEOUT, channel.notify(notification)).await {
        Ok(Ok(())) => debug!(kind = ?kind, "Notification delivered"),
        Ok(Err(e)) => warn!(kind = ?kind, error = %e, "Failed to deliver notification"),
        Err(_) => warn!(kind = ?kind, "Notification delivery timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenChannel;

    #[async_trait]
    impl NotificationChannel for BrokenChannel {
        async fn notify(&self, _notification: Notification) -> Result<()> {
            anyhow::bail!("no display")
        }
    }

    struct StalledChannel;

    #[async_trait]
    impl NotificationChannel for StalledChannel {
        async fn notify(&self, _notification: Notification) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingChannel(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        async fn notify(&self, _notification: Notification) -> Result<()> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_swallows_channel_errors() {
        let notifier = Notifier::new(Some(Arc::new(BrokenChannel)));
        notifier.send(Notification::ready(0));
        notifier.flush().await;
    }

    #[tokio::test]
    async fn test_send_does_not_wait_for_slow_channel() {
        let notifier = Notifier::new(Some(Arc::new(StalledChannel)));

        let started = std::time::Instant::now();
        for _ in 0..3 {
            notifier.send(Notification::enumeration_failed("query failed"));
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_flush_waits_for_delivery() {
        let channel = Arc::new(CountingChannel::default());
        let notifier = Notifier::new(Some(channel.clone()));

        notifier.send(Notification::ready(0));
        notifier.send(Notification::ready(1));
        notifier.flush().await;
        assert_eq!(channel.0.load(std::sync::atomic::Ordering::SeqCst), 2);

        notifier.send(Notification::ready(2));
        notifier.flush().await;
        assert_eq!(channel.0.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_send_without_channel_is_a_no_op() {
        let notifier = Notifier::new(None);
        notifier.send(Notification::ready(0));
        notifier.flush().await;
    }

    #[test]
    fn test_default_config_uses_desktop_channel() {
        let config = NotificationConfig::default();
        assert_eq!(config.channel, NotificationChannelType::Desktop);
        assert!(create_channel(&config).is_some());
    }

    #[test]
    fn test_slack_without_webhook_has_no_channel() {
        let config = NotificationConfig {
            channel: NotificationChannelType::Slack,
            slack_webhook: None,
        };
        assert!(create_channel(&config).is_none());
    }

    #[test]
    fn test_failure_is_urgent() {
        let volume = VolumeId::parse("D:").unwrap();
        assert!(Notification::failed(&volume, "boom").urgent);
        assert!(!Notification::succeeded(&volume, 1).urgent);
        assert!(Notification::succeeded(&volume, 1).message.contains("safe to eject"));
    }
}
