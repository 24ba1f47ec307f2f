//! Email delivery of job results. Best-effort: failures are logged, never
//! retried, and never reported back to the job.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::error::{Error, Result};

pub const SUBJECT: &str = "Your download";

/// Plain-text message delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `body` to `to`. Never fails from the caller's point of view.
    async fn send(&self, to: &str, body: &str);
}

fn build_message(from: &str, to: &str, body: &str) -> Result<Message> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| Error::Mail(format!("invalid sender address {from:?}: {e}")))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| Error::Mail(format!("invalid recipient address {to:?}: {e}")))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(SUBJECT)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| Error::Mail(e.to_string()))
}

/// SMTP notifier (STARTTLS relay). Without credentials it only logs.
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let Some(creds) = &config.credentials else {
            warn!("email credentials not set (EMAIL_USER / EMAIL_PASSWORD), notifications disabled");
            return Ok(Self {
                mailer: None,
                from: String::new(),
            });
        };

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| Error::Mail(format!("invalid SMTP relay {}: {e}", config.host)))?
            .port(config.port)
            .credentials(SmtpCredentials::new(
                creds.user.clone(),
                creds.password.clone(),
            ))
            .build();

        info!(host = %config.host, port = config.port, "email notifier initialized (SMTP with STARTTLS)");

        Ok(Self {
            mailer: Some(Arc::new(mailer)),
            from: creds.user.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    async fn try_send(&self, mailer: &AsyncSmtpTransport<Tokio1Executor>, to: &str, body: &str) -> Result<()> {
        let message = build_message(&self.from, to, body)?;
        mailer
            .send(message)
            .await
            .map_err(|e| Error::Mail(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, body: &str) {
        let Some(mailer) = &self.mailer else {
            warn!(%to, "email credentials not set, notification dropped");
            return;
        };

        match self.try_send(mailer, to, body).await {
            Ok(()) => info!(%to, "notification sent"),
            Err(e) => warn!(%to, error = %e, "failed to send notification"),
        }
    }
}
