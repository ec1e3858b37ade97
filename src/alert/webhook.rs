use super::dispatcher::{Alert, AlertDispatcher};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::time::Duration;

/// Posts alerts as `{"content": "..."}` JSON, the payload shape chat webhooks accept.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    url: String,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, alert: &Alert) -> Result<()> {
        let payload = serde_json::json!({
            "content": alert.render(),
        });

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("webhook request failed")?
            .error_for_status()
            .context("webhook rejected alert")?;

        tracing::debug!(
            target: "jobwatch::alerts",
            job = %format!("{:#x}", alert.address),
            block = alert.current_block,
            "alert delivered to webhook"
        );
        Ok(())
    }
}

impl AlertDispatcher for WebhookDispatcher {
    fn send<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.post(alert))
    }
}
