//! SMTP email alerts.
//!
//! Mail goes out over STARTTLS with the configured user as sender. When the
//! server, credentials or recipients are missing the notifier only logs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{NotifyError, Result};
use crate::notifier::Notifier;

/// Default SMTP submission port.
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Time budget for one SMTP conversation.
pub const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP connection and addressing. Empty strings mean "not set".
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpSettings {
    #[serde(default)]
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name, also used as the sender address.
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_SMTP_PORT,
            user: String::new(),
            password: String::new(),
            recipients: Vec::new(),
        }
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("recipients", &self.recipients)
            .finish()
    }
}

impl SmtpSettings {
    /// Whether a server has been named at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.server.trim().is_empty()
    }

    /// Everything needed to actually send mail is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.is_enabled()
            && !self.user.trim().is_empty()
            && !self.password.is_empty()
            && !self.recipients.is_empty()
    }
}

const fn default_port() -> u16 {
    DEFAULT_SMTP_PORT
}

enum Delivery {
    Smtp {
        mailer: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
        to: Vec<Mailbox>,
    },
    LogOnly,
}

/// Sends alerts as plain-text email.
pub struct EmailNotifier {
    delivery: Delivery,
}

impl EmailNotifier {
    /// Build from `settings`. Incomplete settings give a log-only notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if an address does not parse or the TLS parameters
    /// for the server cannot be built.
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        if !settings.is_complete() {
            warn!(
                server = %settings.server,
                "SMTP not fully configured or no recipients; email alerts will only be logged"
            );
            return Ok(Self {
                delivery: Delivery::LogOnly,
            });
        }

        let from = parse_mailbox(&settings.user)?;
        let to = settings
            .recipients
            .iter()
            .map(|address| parse_mailbox(address))
            .collect::<Result<Vec<_>>>()?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(settings.server.trim())
            .map_err(|e| NotifyError::config(format!("SMTP server '{}': {e}", settings.server)))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.user.trim().to_string(),
                settings.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self {
            delivery: Delivery::Smtp { mailer, from, to },
        })
    }

    /// True when messages are logged instead of mailed.
    #[must_use]
    pub const fn is_log_only(&self) -> bool {
        matches!(self.delivery, Delivery::LogOnly)
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse()
        .map_err(|e| NotifyError::config(format!("invalid email address '{address}': {e}")))
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let Delivery::Smtp { mailer, from, to } = &self.delivery else {
            warn!(subject, body, "[email] SMTP not configured; alert logged only");
            return Ok(());
        };

        let message = to
            .iter()
            .fold(Message::builder().from(from.clone()), |builder, mailbox| {
                builder.to(mailbox.clone())
            })
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::config(format!("cannot build email: {e}")))?;

        mailer
            .send(message)
            .await
            .map_err(|e| NotifyError::request(e.to_string()))?;
        info!(subject, recipients = to.len(), "Email alert sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
