use anyhow::{anyhow, Context, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{Alert, AlertChannel};
use crate::config::{EmailSettings, SmtpSecurity};

/// Plain-text email over authenticated SMTP.
pub struct EmailChannel {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl EmailChannel {
    pub fn from_settings(settings: &EmailSettings) -> Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .with_context(|| format!("invalid sender address {}", settings.from))?;
        let to: Mailbox = settings
            .to
            .parse()
            .with_context(|| format!("invalid recipient address {}", settings.to))?;
        let credentials = Credentials::new(settings.username.clone(), settings.password.clone());
        let builder = match settings.security {
            SmtpSecurity::Tls => SmtpTransport::relay(&settings.smtp_host),
            SmtpSecurity::StartTls => SmtpTransport::starttls_relay(&settings.smtp_host),
        }
        .with_context(|| format!("invalid smtp host {}", settings.smtp_host))?;
        let transport = builder
            .port(settings.smtp_port)
            .credentials(credentials)
            .timeout(Some(settings.timeout))
            .build();
        Ok(Self {
            transport,
            from,
            to,
        })
    }

    fn message(&self, alert: &Alert) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(alert.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(alert.body())
            .map_err(|e| anyhow!("build alert email: {}", e))
    }
}

impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn deliver(&self, alert: &Alert) -> Result<()> {
        let message = self.message(alert)?;
        self.transport
            .send(&message)
            .map_err(|e| anyhow!("smtp send failed: {}", e))?;
        Ok(())
    }
}
