use super::{Notification, NotificationChannel};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;

/// Title and body are exported to the helper so scripts never embed them.
const TITLE_VAR: &str = "DRIVESEED_NOTIFY_TITLE";
const MESSAGE_VAR: &str = "DRIVESEED_NOTIFY_MESSAGE";

#[cfg(windows)]
const DEFAULT_PROGRAM: &str = "powershell";
#[cfg(target_os = "macos")]
const DEFAULT_PROGRAM: &str = "osascript";
#[cfg(not(any(windows, target_os = "macos")))]
const DEFAULT_PROGRAM: &str = "notify-send";

#[cfg(windows)]
const TOAST_SCRIPT: &str = r#"
[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null
$template = [Windows.UI.Notifications.ToastNotificationManager]::GetTemplateContent([Windows.UI.Notifications.ToastTemplateType]::ToastText02)
$text = $template.GetElementsByTagName('text')
$text.Item(0).AppendChild($template.CreateTextNode($env:DRIVESEED_NOTIFY_TITLE)) | Out-Null
$text.Item(1).AppendChild($template.CreateTextNode($env:DRIVESEED_NOTIFY_MESSAGE)) | Out-Null
$toast = [Windows.UI.Notifications.ToastNotification]::new($template)
[Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier('driveseed').Show($toast)
"#;

/// Desktop popups through the platform's notification helper: a PowerShell
/// toast on Windows, `osascript` on macOS and `notify-send` elsewhere.
pub struct DesktopNotifier {
    program: String,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
        }
    }
}

impl DesktopNotifier {
    #[cfg(windows)]
    fn args(_notification: &Notification) -> Vec<String> {
        vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            TOAST_SCRIPT.to_string(),
        ]
    }

    #[cfg(target_os = "macos")]
    fn args(_notification: &Notification) -> Vec<String> {
        vec![
            "-e".to_string(),
            format!(
                "display notification (system attribute \"{MESSAGE_VAR}\") with title (system attribute \"{TITLE_VAR}\")"
            ),
        ]
    }

    #[cfg(not(any(windows, target_os = "macos")))]
    fn args(notification: &Notification) -> Vec<String> {
        let urgency = if notification.urgent {
            "critical"
        } else {
            "normal"
        };
        vec![
            "--app-name=driveseed".to_string(),
            format!("--urgency={}", urgency),
            notification.title.clone(),
            notification.message.clone(),
        ]
    }

    fn command(&self, notification: &Notification) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(notification))
            .env(TITLE_VAR, &notification.title)
            .env(MESSAGE_VAR, &notification.message)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl NotificationChannel for DesktopNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let output = self
            .command(&notification)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notifications::NotificationKind;
    use std::ffi::OsStr;

    fn failure() -> Notification {
        Notification {
            kind: NotificationKind::Failed,
            title: "Copy Failed".to_string(),
            message: "boom; $(rm -rf /)".to_string(),
            urgent: true,
        }
    }

    #[test]
    fn test_default_program_matches_target() {
        let program = DesktopNotifier::default().program;
        if cfg!(windows) {
            assert_eq!(program, "powershell");
        } else if cfg!(target_os = "macos") {
            assert_eq!(program, "osascript");
        } else {
            assert_eq!(program, "notify-send");
        }
    }

    #[test]
    fn test_text_passed_through_environment() {
        let notifier = DesktopNotifier::default();
        let cmd = notifier.command(&failure());

        let envs: Vec<_> = cmd.as_std().get_envs().collect();
        assert!(envs.contains(&(OsStr::new(TITLE_VAR), Some(OsStr::new("Copy Failed")))));
        assert!(envs.contains(&(
            OsStr::new(MESSAGE_VAR),
            Some(OsStr::new("boom; $(rm -rf /)"))
        )));
    }

    #[cfg(not(any(windows, target_os = "macos")))]
    #[test]
    fn test_urgency_flag() {
        let args = DesktopNotifier::args(&failure());
        assert!(args.contains(&"--urgency=critical".to_string()));
        assert_eq!(args.last().unwrap(), "boom; $(rm -rf /)");
    }

    #[cfg(any(windows, target_os = "macos"))]
    #[test]
    fn test_script_does_not_embed_text() {
        let args = DesktopNotifier::args(&failure());
        assert!(args.iter().all(|arg| !arg.contains("boom")));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let notifier = DesktopNotifier {
            program: "definitely-not-a-real-notifier".to_string(),
        };
        assert!(notifier.notify(Notification::ready(0)).await.is_err());
    }
}
