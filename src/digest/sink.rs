use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::config::DigestConfig;
use crate::digest::Digest;

#[async_trait]
pub trait DigestSink: Send + Sync {
    async fn send(&self, digest: &Digest) -> Result<()>;
}

pub struct StdoutSink;

#[async_trait]
impl DigestSink for StdoutSink {
    async fn send(&self, digest: &Digest) -> Result<()> {
        println!("To: {}\nSubject: {}\n\n{}", digest.email, digest.subject(), digest.text());
        Ok(())
    }
}

pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("shiftmatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn is_discord(&self) -> bool {
        self.url.contains("discord.com/api/webhooks")
            || self.url.contains("discordapp.com/api/webhooks")
    }
}

#[async_trait]
impl DigestSink for WebhookSink {
    async fn send(&self, digest: &Digest) -> Result<()> {
        let req = if self.is_discord() {
            let content = format!("**{}** ({})\n{}", digest.subject(), digest.email, digest.text());
            self.client
                .post(&self.url)
                .json(&serde_json::json!({ "content": content }))
        } else {
            self.client.post(&self.url).json(digest)
        };

        req.send()
            .await
            .with_context(|| format!("failed POST request: {}", self.url))?
            .error_for_status()?;
        Ok(())
    }
}

/// Sinks enabled by the `[digest]` section, in delivery order.
pub fn build_sinks(config: &DigestConfig) -> Result<Vec<Box<dyn DigestSink>>> {
    let mut sinks: Vec<Box<dyn DigestSink>> = Vec::new();
    if config.enable_stdout {
        sinks.push(Box::new(StdoutSink));
    }
    if !config.webhook_url.trim().is_empty() {
        sinks.push(Box::new(WebhookSink::new(config.webhook_url.trim())?));
    }
    Ok(sinks)
}
