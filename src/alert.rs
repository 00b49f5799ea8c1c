//! Operator alerts. Delivery is best-effort: a channel failure is logged and
//! never surfaces to the pipeline.

use crate::config::{AlertConfig, EmailConfig};
use crate::error::Stage;
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use reqwest::Client;
use std::time::Duration;

#[async_trait]
pub trait Alerter: Send + Sync {
    async fn notify(&self, message: &str);
}

#[async_trait]
trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, message: &str) -> Result<()>;
}

/// Alert text for an aborted cycle.
pub fn failure_message(title: Option<&str>, stage: Stage, reason: &str) -> String {
    format!(
        "🚨 Reel production failed\nTitle: {}\nStage: {}\nReason: {}",
        title.unwrap_or("(none selected)"),
        stage,
        reason
    )
}

struct Telegram {
    client: Client,
    token: String,
    chat_id: String,
}

#[async_trait]
impl AlertChannel for Telegram {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": message,
                "disable_web_page_preview": true,
            }))
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .context("Telegram request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("Telegram HTTP {}", resp.status().as_u16());
        }
        Ok(())
    }
}

struct Email {
    cfg: EmailConfig,
}

impl Email {
    fn build(&self, message: &str) -> Result<Message> {
        Message::builder()
            .from(self.cfg.from.parse().context("invalid alert sender address")?)
            .to(self.cfg.to.parse().context("invalid alert recipient address")?)
            .subject("Reel production alert")
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .context("building alert email")
    }
}

#[async_trait]
impl AlertChannel for Email {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, message: &str) -> Result<()> {
        let email = self.build(message)?;
        let cfg = self.cfg.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mailer = SmtpTransport::relay(&cfg.smtp_host)
                .context("SMTP relay configuration error")?
                .credentials(Credentials::new(cfg.username, cfg.password))
                .timeout(Some(Duration::from_secs(30)))
                .build();
            mailer.send(&email).context("SMTP send failed")?;
            Ok(())
        })
        .await
        .context("email task panicked")?
    }
}

/// Fans one message out to every configured channel.
pub struct AlertDispatcher {
    channels: Vec<Box<dyn AlertChannel>>,
}

impl AlertDispatcher {
    pub fn from_config(client: Client, cfg: &AlertConfig) -> Self {
        let mut channels: Vec<Box<dyn AlertChannel>> = Vec::new();
        if !cfg.telegram_bot_token.is_empty() && !cfg.telegram_chat_id.is_empty() {
            channels.push(Box::new(Telegram {
                client,
                token: cfg.telegram_bot_token.clone(),
                chat_id: cfg.telegram_chat_id.clone(),
            }));
        }
        if let Some(email) = cfg.email.as_ref().filter(|e| !e.smtp_host.is_empty()) {
            channels.push(Box::new(Email { cfg: email.clone() }));
        }
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Alerter for AlertDispatcher {
    async fn notify(&self, message: &str) {
        if self.channels.is_empty() {
            logw(format!("No alert channel configured; alert dropped: {}", message));
            return;
        }
        for channel in &self.channels {
            match channel.send(message).await {
                Ok(()) => logi(format!("Alert sent via {}", channel.name())),
                Err(err) => logw(format!("Alert via {} failed: {:#}", channel.name(), err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_names_title_and_stage() {
        let msg = failure_message(Some("Heat"), Stage::AssetResolving, "no footage");
        assert!(msg.contains("Title: Heat"));
        assert!(msg.contains("Stage: asset resolution"));
        assert!(msg.contains("no footage"));
        assert!(failure_message(None, Stage::Gated, "x").contains("(none selected)"));
    }

    #[test]
    fn only_configured_channels_are_built() {
        let none = AlertDispatcher::from_config(Client::new(), &AlertConfig::default());
        assert_eq!(none.channel_count(), 0);

        let cfg = AlertConfig {
            telegram_bot_token: "t".into(),
            telegram_chat_id: "c".into(),
            email: Some(EmailConfig {
                smtp_host: "smtp.example.com".into(),
                username: "u".into(),
                password: "p".into(),
                from: "bot@example.com".into(),
                to: "ops@example.com".into(),
            }),
        };
        assert_eq!(AlertDispatcher::from_config(Client::new(), &cfg).channel_count(), 2);
    }

    #[test]
    fn bad_addresses_fail_the_email_build() {
        let email = Email {
            cfg: EmailConfig {
                smtp_host: "smtp.example.com".into(),
                username: "u".into(),
                password: "p".into(),
                from: "not an address".into(),
                to: "ops@example.com".into(),
            },
        };
        assert!(email.build("hi").is_err());
    }

    #[tokio::test]
    async fn dispatch_without_channels_is_silent() {
        let none = AlertDispatcher::from_config(Client::new(), &AlertConfig::default());
        none.notify("boom").await;
    }
}
