use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::debug;

use crate::config::Credentials;
use crate::error::NotifyError;
use crate::notifier::Notifier;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage` client.
pub struct TelegramNotifier {
    client: reqwest::Client,
    credentials: Credentials,
    parse_mode: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

impl TelegramNotifier {
    pub fn new(
        credentials: Credentials,
        parse_mode: Option<String>,
        timeout: Duration,
    ) -> Result<Self, Report<NotifyError>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .change_context(NotifyError::Request)?;
        Ok(Self {
            client,
            credentials,
            parse_mode,
        })
    }

    fn payload<'a>(&'a self, text: &'a str) -> SendMessage<'a> {
        SendMessage {
            chat_id: &self.credentials.chat_id,
            text,
            parse_mode: self.parse_mode.as_deref(),
        }
    }

    async fn send_message(&self, text: &str) -> Result<(), Report<NotifyError>> {
        let url = format!(
            "{TELEGRAM_API_URL}/bot{}/sendMessage",
            self.credentials.token
        );

        // The bot token is part of the URL; strip it from transport errors.
        let response = self
            .client
            .post(&url)
            .json(&self.payload(text))
            .send()
            .await
            .map_err(|e| Report::new(e.without_url()).change_context(NotifyError::Request))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Report::new(NotifyError::Rejected {
                status: status.as_u16(),
            })
            .attach(body));
        }

        debug!(chars = text.chars().count(), "telegram message sent");
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), Report<NotifyError>>> {
        Box::pin(self.send_message(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            token: "test-token".into(),
            chat_id: "12345".into(),
        }
    }

    #[test]
    fn payload_includes_parse_mode_when_set() {
        let notifier = TelegramNotifier::new(
            credentials(),
            Some("Markdown".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        let json = serde_json::to_value(notifier.payload("hi")).unwrap();
        assert_eq!(json["chat_id"], "12345");
        assert_eq!(json["text"], "hi");
        assert_eq!(json["parse_mode"], "Markdown");
    }

    #[test]
    fn payload_omits_parse_mode_when_unset() {
        let notifier =
            TelegramNotifier::new(credentials(), None, Duration::from_secs(5)).unwrap();
        let json = serde_json::to_value(notifier.payload("hi")).unwrap();
        assert!(json.get("parse_mode").is_none());
    }

    /// Integration test: requires TELEGRAM_TOKEN and CHAT_ID. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_send_message() {
        let credentials = Credentials::from_env().expect("TELEGRAM_TOKEN and CHAT_ID must be set");
        let notifier =
            TelegramNotifier::new(credentials, None, Duration::from_secs(10)).unwrap();
        notifier.send("market-scanner integration test").await.unwrap();
    }
}
