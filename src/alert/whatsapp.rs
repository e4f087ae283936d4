use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use super::{Alert, AlertChannel};
use crate::config::WhatsAppSettings;

/// Text message through the WhatsApp Cloud API
/// (`POST <api_base>/<phone_number_id>/messages`).
pub struct WhatsAppChannel {
    agent: ureq::Agent,
    endpoint: String,
    to: String,
    access_token: String,
}

impl WhatsAppChannel {
    pub fn new(
        api_base: &str,
        phone_number_id: &str,
        to: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let to = to.into();
        let access_token = access_token.into();
        if phone_number_id.trim().is_empty() {
            return Err(anyhow!("whatsapp phone_number_id is empty"));
        }
        if to.trim().is_empty() {
            return Err(anyhow!("whatsapp recipient is empty"));
        }
        if access_token.trim().is_empty() {
            return Err(anyhow!("whatsapp access token is empty"));
        }
        Ok(Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            endpoint: messages_endpoint(api_base, phone_number_id),
            to,
            access_token,
        })
    }

    pub fn from_settings(settings: &WhatsAppSettings) -> Result<Self> {
        Self::new(
            &settings.api_base,
            &settings.phone_number_id,
            settings.to.clone(),
            settings.access_token.clone(),
            settings.timeout,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AlertChannel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    fn deliver(&self, alert: &Alert) -> Result<()> {
        let payload = message_payload(&self.to, &alert.message);
        let result = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .send_json(payload);
        match result {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(anyhow!("whatsapp api returned {}: {}", code, body.trim()))
            }
            Err(e) => Err(anyhow!("whatsapp request failed: {}", e)),
        }
    }
}

fn messages_endpoint(api_base: &str, phone_number_id: &str) -> String {
    format!(
        "{}/{}/messages",
        api_base.trim_end_matches('/'),
        phone_number_id.trim()
    )
}

fn message_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "text",
        "text": { "body": body },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_phone_id() {
        assert_eq!(
            messages_endpoint("https://graph.facebook.com/v18.0/", " 1234 "),
            "https://graph.facebook.com/v18.0/1234/messages"
        );
    }

    #[test]
    fn channel_posts_to_the_phone_number_endpoint() -> Result<()> {
        let channel = WhatsAppChannel::new(
            "https://graph.facebook.com/v18.0",
            "98765",
            "15551234567",
            "token",
            Duration::from_secs(5),
        )?;
        assert_eq!(
            channel.endpoint(),
            "https://graph.facebook.com/v18.0/98765/messages"
        );
        Ok(())
    }

    #[test]
    fn payload_is_a_text_message() {
        let payload = message_payload("15551234567", "Warning! Mask not detected.");
        assert_eq!(payload["messaging_product"], "whatsapp");
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["to"], "15551234567");
        assert_eq!(payload["text"]["body"], "Warning! Mask not detected.");
    }

    #[test]
    fn empty_credentials_are_rejected() {
        let timeout = Duration::from_secs(1);
        assert!(WhatsAppChannel::new("https://x", "1", "2", "", timeout).is_err());
        assert!(WhatsAppChannel::new("https://x", "", "2", "t", timeout).is_err());
        assert!(WhatsAppChannel::new("https://x", "1", "2", "t", timeout).is_ok());
    }
}
