use std::time::Duration;

use async_trait::async_trait;
use qnc_core::config::EmailConfig;
use qnc_core::notify::{NotificationError, Notifier, QuoteEmail};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::info;

/// Sends quote emails through a stored SendGrid dynamic template.
#[derive(Clone)]
pub struct SendGridNotifier {
    client: Client,
    base_url: String,
    api_key: SecretString,
    from_email: String,
    template_id: String,
    sandbox: bool,
}

impl SendGridNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            from_email: config.from_email.clone(),
            template_id: config.template_id.clone(),
            sandbox: config.sandbox,
        })
    }

    fn payload(&self, email: &QuoteEmail) -> Value {
        json!({
            "personalizations": [{
                "to": [{ "email": email.recipient }],
                "dynamic_template_data": email.template,
            }],
            "from": { "email": self.from_email },
            "template_id": self.template_id,
            "mail_settings": { "sandbox_mode": { "enable": self.sandbox } },
        })
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn send_quote(&self, email: &QuoteEmail) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.payload(email))
            .send()
            .await
            .map_err(|error| NotificationError::Unavailable(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected { status: status.as_u16(), body });
        }

        info!(
            event_name = "notify.sendgrid.accepted",
            status = status.as_u16(),
            sandbox = self.sandbox,
            "quote email accepted by provider"
        );
        Ok(())
    }
}
