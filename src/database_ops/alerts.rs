use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};

/// Title characters kept in a notification line.
pub const ALERT_TITLE_CHARS: usize = 40;

/// One failed identifier+region pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureAlert {
    pub appid: String,
    pub region: String,
    pub title: String,
    pub message: String,
}

impl FailureAlert {
    /// `<identifier> - <partial title> : <error message>`
    pub fn text(&self) -> String {
        let title: String = self.title.chars().take(ALERT_TITLE_CHARS).collect();
        format!("{} - {} : {}", self.appid, title, self.message)
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Out-of-band failure reporting. Implementations must never fail the batch.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, alert: &FailureAlert);
}

/// Logs the alert and nothing else; used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, alert: &FailureAlert) {
        error!(
            appid = %alert.appid,
            region = %alert.region,
            title = %alert.title,
            error = %alert.message,
            "steam: pass failed"
        );
    }
}

/// Posts `{"text": ...}` to a chat-style webhook.
pub struct WebhookAlertSink {
    client: Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn notify(&self, alert: &FailureAlert) {
        LogAlertSink.notify(alert).await;
        let text = alert.text();
        let sent = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { text: &text })
            .send()
            .await
            .and_then(|resp| resp.error_for_status());
        if let Err(e) = sent {
            warn!(appid = %alert.appid, error = %e, "webhook delivery failed");
        }
    }
}

/// Webhook sink when a URL is configured, log-only otherwise.
pub fn sink_from_config(webhook_url: Option<&str>) -> anyhow::Result<Box<dyn AlertSink>> {
    Ok(match webhook_url {
        Some(url) => Box::new(WebhookAlertSink::new(url)?),
        None => Box::new(LogAlertSink),
    })
}
