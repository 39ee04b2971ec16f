//! Outbound email dispatch.

use async_trait::async_trait;
use automation_core::{error::MailErrorCode, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A rendered email ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Why a message was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("mail provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("mail transport error: {0}")]
    Transport(String),
}

/// Email channel.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Whether credentials and a sender identity are present.
    fn is_configured(&self) -> bool;

    async fn send(&self, message: &MailMessage) -> std::result::Result<(), DispatchError>;
}

/// Mail provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Provider API key; the channel is disabled without one
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sender address
    #[serde(default)]
    pub from_address: Option<String>,
    /// Sender display name
    #[serde(default)]
    pub from_name: Option<String>,
    /// Send endpoint (SendGrid v3 compatible)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            from_address: None,
            from_name: None,
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl MailConfig {
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.api_key) && present(&self.from_address)
    }
}

/// Mailer posting to an HTTP mail API with a bearer key.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: Url,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            Error::config(format!("Invalid mail endpoint '{}': {}", config.endpoint, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                Error::mail(
                    MailErrorCode::DispatchFailed,
                    format!("Failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    /// Request body for one message.
    pub fn request_body(&self, message: &MailMessage) -> serde_json::Value {
        let mut from = json!({ "email": self.config.from_address.as_deref().unwrap_or_default() });
        if let Some(name) = self.config.from_name.as_deref().filter(|n| !n.is_empty()) {
            from["name"] = json!(name);
        }

        json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": from,
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.html }],
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn send(&self, message: &MailMessage) -> std::result::Result<(), DispatchError> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&self.request_body(message))
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(to = %message.to, status = status.as_u16(), "Mail accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
