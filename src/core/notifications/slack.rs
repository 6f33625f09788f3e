use super::{Notification, NotificationChannel};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    fn format_message(&self, notification: &Notification) -> serde_json::Value {
        let header = if notification.urgent {
            format!(":warning: {}", notification.title)
        } else {
            notification.title.clone()
        };

        json!({
            "text": format!("{}: {}", notification.title, notification.message),
            "blocks": [
                {
                    "type": "header",
                    "text": {
                        "type": "plain_text",
                        "text": header,
                        "emoji": true
                    }
                },
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": notification.message
                    }
                }
            ]
        })
    }
}

#[async_trait]
impl NotificationChannel for SlackNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let payload = self.format_message(&notification);
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::volume::VolumeId;

    #[test]
    fn test_format_message_marks_urgent_header() {
        let notifier = SlackNotifier::new("http://localhost/hook".to_string());
        let volume = VolumeId::parse("E:").unwrap();

        let payload = notifier.format_message(&Notification::failed(&volume, "disk full"));
        let header = payload["blocks"][0]["text"]["text"].as_str().unwrap();
        let body = payload["blocks"][1]["text"]["text"].as_str().unwrap();

        assert!(header.starts_with(":warning:"));
        assert!(body.contains("E:"));
        assert!(body.contains("disk full"));
    }
}
