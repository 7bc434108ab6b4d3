use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;

use crate::config::MailApiConfig;

const OUTBOX_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outbound email. Without a mail API configured, messages are logged
/// instead of delivered and the most recent ones are kept in a bounded
/// in-process outbox.
#[derive(Debug, Clone)]
pub enum Mailer {
    Log(LogMailer),
    Http(HttpMailer),
}

#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    outbox: Arc<RwLock<VecDeque<OutgoingEmail>>>,
}

#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: Client,
    config: MailApiConfig,
    from: String,
}

impl Mailer {
    pub fn log() -> Self {
        Self::Log(LogMailer::default())
    }

    pub fn http(client: Client, config: MailApiConfig, from: impl Into<String>) -> Self {
        Self::Http(HttpMailer {
            client,
            config,
            from: from.into(),
        })
    }

    pub fn transport(&self) -> &'static str {
        match self {
            Self::Log(_) => "log",
            Self::Http(_) => "http",
        }
    }

    pub async fn send(&self, email: OutgoingEmail) -> Result<()> {
        match self {
            Self::Log(mailer) => {
                tracing::info!(to = %email.to, subject = %email.subject, "email recorded in outbox");
                mailer.record(email);
                Ok(())
            }
            Self::Http(mailer) => mailer.send(&email).await,
        }
    }

    /// Messages recorded by the log transport, oldest first.
    pub fn outbox(&self) -> Vec<OutgoingEmail> {
        match self {
            Self::Log(mailer) => mailer.outbox.read().iter().cloned().collect(),
            Self::Http(_) => Vec::new(),
        }
    }
}

impl LogMailer {
    fn record(&self, email: OutgoingEmail) {
        let mut outbox = self.outbox.write();
        while outbox.len() >= OUTBOX_CAPACITY {
            outbox.pop_front();
        }
        outbox.push_back(email);
    }
}

impl HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let response = self
            .client
            .post(self.config.url.as_str())
            .bearer_auth(self.config.api_key.as_str())
            .json(&json!({
                "from": self.from,
                "to": email.to,
                "subject": email.subject,
                "html": email.html,
            }))
            .send()
            .await
            .context("mail API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("mail API non-success status {}: {}", status.as_u16(), body);
        }

        tracing::info!(to = %email.to, subject = %email.subject, "email delivered to mail API");
        Ok(())
    }
}
