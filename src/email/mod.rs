//! Outbound email.
//!
//! Request handlers never wait on delivery: they hand an [`EmailMessage`] to
//! the [`EmailDispatcher`], which queues it for a small pool of background
//! workers (see [`worker`]). Delivery itself is behind [`EmailSender`]:
//! `LogEmailSender` for local development, `WebhookEmailSender` to POST the
//! message to an HTTP mail relay.

pub mod templates;
pub mod worker;

pub use worker::{EmailDispatcher, EmailWorkerConfig};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message. An error makes the worker retry.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Logs instead of sending.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    #[serde(flatten)]
    message: &'a EmailMessage,
}

/// POSTs `{from, to, subject, body}` as JSON to a mail relay endpoint.
#[derive(Clone, Debug)]
pub struct WebhookEmailSender {
    client: reqwest::Client,
    endpoint: url::Url,
    from: String,
}

impl WebhookEmailSender {
    pub fn new(endpoint: url::Url, from: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build email webhook client")?;
        Ok(Self {
            client,
            endpoint,
            from: from.into(),
        })
    }
}

#[async_trait]
impl EmailSender for WebhookEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.client
            .post(self.endpoint.clone())
            .json(&WebhookPayload {
                from: &self.from,
                message,
            })
            .send()
            .await
            .context("email relay unreachable")?
            .error_for_status()
            .context("email relay rejected message")?;
        Ok(())
    }
}
