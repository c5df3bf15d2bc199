use nexus_core::config::{HttpConfig, NotificationConfig};
use nexus_core::error::AppError;
use nexus_core::resilient::{RequestOptions, ResilientClient};
use nexus_core::traits::{Notifier, Transport};
use serde_json::{Value, json};

use crate::email::EmailChannel;

const TELEGRAM_API: &str = "https://api.telegram.org/";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChannelKind {
    Telegram { token: String, chat_id: String },
    Slack,
    Discord,
}

impl ChannelKind {
    fn name(&self) -> &'static str {
        match self {
            ChannelKind::Telegram { .. } => "telegram",
            ChannelKind::Slack => "slack",
            ChannelKind::Discord => "discord",
        }
    }

    fn path(&self) -> String {
        match self {
            ChannelKind::Telegram { token, .. } => format!("./bot{token}/sendMessage"),
            ChannelKind::Slack | ChannelKind::Discord => String::new(),
        }
    }

    fn payload(&self, message: &str) -> Value {
        match self {
            ChannelKind::Telegram { chat_id, .. } => json!({"chat_id": chat_id, "text": message}),
            ChannelKind::Slack => json!({"text": message}),
            ChannelKind::Discord => json!({"content": message}),
        }
    }
}

struct Channel<T: Transport> {
    kind: ChannelKind,
    client: ResilientClient<T>,
}

/// Sends notifications to every configured chat webhook and to email.
///
/// Each webhook owns its own [`ResilientClient`], so a dead Slack hook trips
/// only Slack's breaker. Webhook URLs carry credentials and are kept out of
/// logs. Channels without credentials are left out.
pub struct ChannelNotifier<T: Transport> {
    channels: Vec<Channel<T>>,
    email: Option<EmailChannel>,
    options: RequestOptions,
}

impl<T: Transport> ChannelNotifier<T> {
    pub fn from_config(
        config: &NotificationConfig,
        http: &HttpConfig,
        transport: T,
    ) -> Result<Self, AppError> {
        Self::with_telegram_api(config, http, transport, TELEGRAM_API)
    }

    /// Like [`from_config`](Self::from_config) with a custom Telegram Bot API root.
    pub fn with_telegram_api(
        config: &NotificationConfig,
        http: &HttpConfig,
        transport: T,
        telegram_api: &str,
    ) -> Result<Self, AppError> {
        let mut endpoints = Vec::new();

        match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) => endpoints.push((
                ChannelKind::Telegram {
                    token: token.clone(),
                    chat_id: chat_id.clone(),
                },
                telegram_api.to_string(),
            )),
            (None, None) => {}
            _ => tracing::warn!("Telegram credentials incomplete, channel disabled"),
        }
        if let Some(url) = &config.slack_webhook_url {
            endpoints.push((ChannelKind::Slack, url.clone()));
        }
        if let Some(url) = &config.discord_webhook_url {
            endpoints.push((ChannelKind::Discord, url.clone()));
        }

        let channels = endpoints
            .into_iter()
            .map(|(kind, base)| -> Result<_, AppError> {
                let client =
                    ResilientClient::with_breaker_config(&base, transport.clone(), http.breaker_config())
                        .map_err(|_| {
                            AppError::ConfigError(format!("Invalid {} endpoint URL", kind.name()))
                        })?
                        .with_redacted_paths();
                Ok(Channel { kind, client })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            channels,
            email: EmailChannel::from_config(config, http.timeout())?,
            options: http.request_options(),
        })
    }

    /// Names of the enabled channels, in send order.
    pub fn channels(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.channels.iter().map(|c| c.kind.name()).collect();
        if self.email.is_some() {
            names.push("email");
        }
        names
    }
}

impl<T: Transport> Notifier for ChannelNotifier<T> {
    async fn notify(&self, message: &str) -> Result<(), AppError> {
        if self.channels.is_empty() && self.email.is_none() {
            tracing::debug!("No notification channels configured");
            return Ok(());
        }

        let mut failed = Vec::new();
        for channel in &self.channels {
            let name = channel.kind.name();
            let payload = channel.kind.payload(message);
            let sent = channel
                .client
                .post(&channel.kind.path(), Some(&payload), &self.options)
                .await;

            match sent {
                Ok(Some(_)) => tracing::info!(channel = name, "Notification sent"),
                Ok(None) => {
                    tracing::error!(channel = name, "Failed to send notification");
                    failed.push(name);
                }
                Err(e) => {
                    tracing::error!(channel = name, error = %e, "Failed to send notification");
                    failed.push(name);
                }
            }
        }

        if let Some(email) = &self.email {
            match email.send(message).await {
                Ok(()) => tracing::info!(channel = "email", "Notification sent"),
                Err(e) => {
                    tracing::error!(channel = "email", error = %e, "Failed to send notification");
                    failed.push("email");
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(AppError::NotificationError(format!(
                "Delivery failed for: {}",
                failed.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use nexus_core::models::{HttpMethod, HttpResponse};
    use nexus_core::testutil::MockTransport;

    use super::*;

    fn all_channels() -> NotificationConfig {
        NotificationConfig {
            telegram_bot_token: Some("123:abc".into()),
            telegram_chat_id: Some("42".into()),
            slack_webhook_url: Some("https://hooks.slack.test/services/T0/B0/xyz".into()),
            discord_webhook_url: Some("https://discord.test/api/webhooks/1/tok".into()),
            ..Default::default()
        }
    }

    fn no_retries() -> HttpConfig {
        HttpConfig {
            retries: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sends_to_every_channel() {
        let transport = MockTransport::empty();
        let notifier =
            ChannelNotifier::from_config(&all_channels(), &no_retries(), transport.clone()).unwrap();

        notifier.notify("Scraped 20 items from books").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.method == HttpMethod::Post));

        assert_eq!(
            requests[0].url,
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
        assert_eq!(
            requests[0].body,
            Some(json!({"chat_id": "42", "text": "Scraped 20 items from books"}))
        );
        assert_eq!(requests[1].url, "https://hooks.slack.test/services/T0/B0/xyz");
        assert_eq!(requests[1].body, Some(json!({"text": "Scraped 20 items from books"})));
        assert_eq!(requests[2].url, "https://discord.test/api/webhooks/1/tok");
        assert_eq!(
            requests[2].body,
            Some(json!({"content": "Scraped 20 items from books"}))
        );
    }

    #[tokio::test]
    async fn unconfigured_channels_are_skipped() {
        let config = NotificationConfig {
            telegram_bot_token: Some("123:abc".into()),
            slack_webhook_url: Some("https://hooks.slack.test/x".into()),
            ..Default::default()
        };
        let transport = MockTransport::empty();
        let notifier = ChannelNotifier::from_config(&config, &no_retries(), transport.clone()).unwrap();

        assert_eq!(notifier.channels(), vec!["slack"]);
        notifier.notify("hi").await.unwrap();
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn no_channels_is_a_no_op() {
        let transport = MockTransport::empty();
        let notifier =
            ChannelNotifier::from_config(&NotificationConfig::default(), &no_retries(), transport.clone())
                .unwrap();

        notifier.notify("hi").await.unwrap();
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_channel_reported_but_others_still_sent() {
        let transport = MockTransport::with_responses(vec![
            Ok(HttpResponse::new(401, r#"{"ok": false}"#)),
            Ok(HttpResponse::new(200, "ok")),
            Ok(HttpResponse::new(204, "")),
        ]);
        let notifier =
            ChannelNotifier::from_config(&all_channels(), &no_retries(), transport.clone()).unwrap();

        let err = notifier.notify("hi").await.unwrap_err();

        assert_eq!(transport.call_count(), 3);
        match err {
            AppError::NotificationError(msg) => {
                assert!(msg.contains("telegram"));
                assert!(!msg.contains("slack"));
            }
            other => panic!("expected NotificationError, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_retried_per_channel() {
        let config = NotificationConfig {
            discord_webhook_url: Some("https://discord.test/api/webhooks/1/tok".into()),
            ..Default::default()
        };
        let transport = MockTransport::with_responses(vec![
            Ok(HttpResponse::new(502, "bad gateway")),
            Ok(HttpResponse::new(204, "")),
        ]);
        let http = HttpConfig {
            retries: 1,
            ..Default::default()
        };
        let notifier = ChannelNotifier::from_config(&config, &http, transport.clone()).unwrap();

        notifier.notify("hi").await.unwrap();

        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn custom_telegram_api_root() {
        let config = NotificationConfig {
            telegram_bot_token: Some("t".into()),
            telegram_chat_id: Some("c".into()),
            ..Default::default()
        };
        let transport = MockTransport::empty();
        let notifier = ChannelNotifier::with_telegram_api(
            &config,
            &no_retries(),
            transport.clone(),
            "http://127.0.0.1:9000/",
        )
        .unwrap();

        notifier.notify("hi").await.unwrap();

        assert_eq!(transport.requests()[0].url, "http://127.0.0.1:9000/bott/sendMessage");
    }

    #[test]
    fn invalid_webhook_url_is_config_error() {
        let config = NotificationConfig {
            slack_webhook_url: Some("not a url".into()),
            ..Default::default()
        };
        let result = ChannelNotifier::from_config(&config, &no_retries(), MockTransport::empty());
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn breaker_names_hide_webhook_secrets() {
        let notifier =
            ChannelNotifier::from_config(&all_channels(), &no_retries(), MockTransport::empty()).unwrap();

        for channel in &notifier.channels {
            let name = channel.client.breaker().name();
            assert!(!name.contains("xyz"), "{name}");
            assert!(!name.contains("tok"), "{name}");
            assert!(!name.contains("123:abc"), "{name}");
        }
    }

    #[test]
    fn invalid_webhook_error_hides_url() {
        let config = NotificationConfig {
            slack_webhook_url: Some("https//hooks.slack.test/services/secret".into()),
            ..Default::default()
        };

        let err = match ChannelNotifier::from_config(&config, &no_retries(), MockTransport::empty()) {
            Err(e) => e,
            Ok(_) => panic!("expected a configuration error"),
        };

        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn complete_email_settings_add_email_channel() {
        let config = NotificationConfig {
            discord_webhook_url: Some("https://discord.test/api/webhooks/1/tok".into()),
            email_host: Some("smtp.example.com".into()),
            email_user: Some("hub@example.com".into()),
            email_password: Some("secret".into()),
            email_to: Some("admin@example.com".into()),
            ..Default::default()
        };

        let notifier = ChannelNotifier::from_config(&config, &no_retries(), MockTransport::empty()).unwrap();

        assert_eq!(notifier.channels(), vec!["discord", "email"]);
    }

    #[test]
    fn incomplete_email_settings_leave_email_out() {
        let config = NotificationConfig {
            email_host: Some("smtp.example.com".into()),
            email_user: Some("hub@example.com".into()),
            ..Default::default()
        };

        let notifier = ChannelNotifier::from_config(&config, &no_retries(), MockTransport::empty()).unwrap();

        assert!(notifier.channels().is_empty());
    }

    #[tokio::test]
    async fn failed_email_is_reported_after_webhooks() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let config = NotificationConfig {
            slack_webhook_url: Some("https://hooks.slack.test/x".into()),
            email_host: Some("127.0.0.1".into()),
            email_port: Some(port),
            email_user: Some("hub@example.com".into()),
            email_password: Some("secret".into()),
            email_to: Some("admin@example.com".into()),
            ..Default::default()
        };
        let transport = MockTransport::empty();
        let notifier = ChannelNotifier::from_config(&config, &no_retries(), transport.clone()).unwrap();

        let err = notifier.notify("hi").await.unwrap_err();

        assert_eq!(transport.call_count(), 1);
        match err {
            AppError::NotificationError(msg) => {
                assert!(msg.contains("email"));
                assert!(!msg.contains("slack"));
            }
            other => panic!("expected NotificationError, got {other:?}"),
        }
    }
}
