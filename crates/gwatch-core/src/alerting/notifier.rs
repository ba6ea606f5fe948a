//! Notification delivery

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};

use crate::config::DingTalkConfig;
use crate::error::Result;

type HmacSha256 = Hmac<Sha256>;

/// Message transport for formatted alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message
    async fn send(&self, title: &str, body: &str) -> Result<()>;
}

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Transport failure or non-2xx response
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// DingTalk answered with a non-zero `errcode`
    #[error("DingTalk API error {code}: {message}")]
    ApiError {
        /// `errcode`
        code: i64,
        /// `errmsg`
        message: String,
    },

    /// Missing or invalid robot settings
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<NotificationError> for crate::Error {
    fn from(err: NotificationError) -> Self {
        Self::Notify(err.to_string())
    }
}

/// DingTalk custom robot notifier
pub struct DingTalkNotifier {
    client: Client,
    webhook_url: String,
    secret: Option<String>,
    at_mobiles: Vec<String>,
}

impl DingTalkNotifier {
    /// Create a notifier from the `dingtalk` configuration section
    pub fn new(config: &DingTalkConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            webhook_url: config.webhook_url.trim().to_string(),
            secret: Some(config.secret.trim().to_string()).filter(|s| !s.is_empty()),
            at_mobiles: config.at_mobiles.clone(),
        })
    }

    /// Append `timestamp` and `sign` query parameters when a secret is configured
    pub fn sign_url(&self, timestamp_ms: i64) -> std::result::Result<String, NotificationError> {
        let Some(secret) = &self.secret else {
            return Ok(self.webhook_url.clone());
        };

        let string_to_sign = format!("{timestamp_ms}\n{secret}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotificationError::ConfigError(e.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        let sign = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        let separator = if self.webhook_url.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{}{separator}timestamp={timestamp_ms}&sign={}",
            self.webhook_url,
            urlencoding::encode(&sign)
        ))
    }
}

#[async_trait]
impl Notifier for DingTalkNotifier {
    async fn send(&self, title: &str, body: &str) -> Result<()> {
        if self.webhook_url.is_empty() {
            return Err(NotificationError::ConfigError("dingtalk.webhook_url is empty".to_string()).into());
        }

        let url = self.sign_url(chrono::Utc::now().timestamp_millis())?;
        let payload = DingTalkPayload {
            msgtype: "markdown",
            markdown: DingTalkMarkdown { title, text: body },
            at: DingTalkAt {
                at_mobiles: &self.at_mobiles,
                is_at_all: false,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::HttpError(format!("DingTalk returned {status}: {body}")).into());
        }

        let reply: DingTalkReply = response
            .json()
            .await
            .map_err(|e| NotificationError::HttpError(e.to_string()))?;
        if reply.errcode != 0 {
            return Err(NotificationError::ApiError {
                code: reply.errcode,
                message: reply.errmsg,
            }
            .into());
        }

        debug!(bytes = body.len(), "DingTalk payload accepted");
        info!(title, "DingTalk notification sent");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct DingTalkPayload<'a> {
    msgtype: &'static str,
    markdown: DingTalkMarkdown<'a>,
    at: DingTalkAt<'a>,
}

#[derive(Debug, Serialize)]
struct DingTalkMarkdown<'a> {
    title: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct DingTalkAt<'a> {
    #[serde(rename = "atMobiles")]
    at_mobiles: &'a [String],
    #[serde(rename = "isAtAll")]
    is_at_all: bool,
}

#[derive(Debug, Deserialize)]
struct DingTalkReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}
