use std::time::Duration;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use nexus_core::config::NotificationConfig;
use nexus_core::error::AppError;

const SUBJECT: &str = "HEX Control Nexus notification";

/// Plain-text notifications over SMTP with STARTTLS.
///
/// The SMTP login doubles as the sender address. The connection is opened per
/// message, so an unreachable relay only fails the send that needed it.
#[derive(Clone)]
pub struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailChannel {
    /// Build the channel from the `email_*` settings.
    ///
    /// Returns `Ok(None)` when the settings are absent or incomplete; the
    /// latter is logged. Unparseable addresses are configuration errors.
    pub fn from_config(
        config: &NotificationConfig,
        timeout: Duration,
    ) -> Result<Option<Self>, AppError> {
        let (Some(host), Some(user), Some(password), Some(to)) = (
            &config.email_host,
            &config.email_user,
            &config.email_password,
            &config.email_to,
        ) else {
            let any_set = config.email_host.is_some()
                || config.email_user.is_some()
                || config.email_password.is_some()
                || config.email_to.is_some();
            if any_set {
                tracing::warn!("Email settings incomplete, channel disabled");
            }
            return Ok(None);
        };

        let from = parse_mailbox(user)?;
        let to = parse_mailbox(to)?;
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::ConfigError(format!("Invalid SMTP host '{host}': {e}")))?
            .port(config.smtp_port())
            .credentials(Credentials::new(user.clone(), password.clone()))
            .timeout(Some(timeout))
            .build();

        tracing::debug!(%host, port = config.smtp_port(), "Email channel enabled");
        Ok(Some(Self { mailer, from, to }))
    }

    pub fn recipient(&self) -> &Mailbox {
        &self.to
    }

    pub async fn send(&self, message: &str) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .map_err(|e| AppError::NotificationError(format!("Failed to build email: {e}")))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| AppError::NotificationError(format!("SMTP delivery failed: {e}")))?;
        Ok(())
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, AppError> {
    raw.parse::<Mailbox>()
        .map_err(|e| AppError::ConfigError(format!("Invalid email address '{raw}': {e}")))
}
