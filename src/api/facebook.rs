use crate::config::FacebookConfig;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

const TITLE_CHARS: usize = 50;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// `Ok(true)` only when the platform confirmed the upload.
    async fn upload(&self, video: &Path, caption: &str, first_comment: Option<&str>) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    id: Option<String>,
}

pub struct FacebookPage {
    client: Client,
    cfg: FacebookConfig,
}

impl FacebookPage {
    pub fn new(client: Client, cfg: FacebookConfig) -> Self {
        Self { client, cfg }
    }

    fn configured(&self) -> bool {
        !self.cfg.page_id.is_empty() && !self.cfg.page_token.is_empty()
    }

    async fn post_comment(&self, object_id: &str, message: &str) -> Result<()> {
        let url = format!(
            "https://graph.facebook.com/{}/{}/comments",
            self.cfg.graph_version, object_id
        );
        let resp = self
            .client
            .post(url)
            .form(&[("message", message), ("access_token", self.cfg.page_token.as_str())])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .context("Facebook comment request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("Facebook comment HTTP {}", resp.status().as_u16());
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for FacebookPage {
    async fn upload(&self, video: &Path, caption: &str, first_comment: Option<&str>) -> Result<bool> {
        if !self.configured() {
            logw("Facebook credentials not configured. Skipping upload.");
            return Ok(false);
        }

        let bytes = fs::read(video)
            .await
            .with_context(|| format!("reading video {}", video.display()))?;
        logi(format!(
            "Uploading to Facebook ({:.2} MB)",
            bytes.len() as f64 / (1024.0 * 1024.0)
        ));

        let title: String = caption.chars().take(TITLE_CHARS).collect();
        let form = Form::new()
            .text("access_token", self.cfg.page_token.clone())
            .text("description", caption.to_string())
            .text("title", title)
            .part("source", Part::bytes(bytes).file_name("reel.mp4"));

        let url = format!(
            "https://graph-video.facebook.com/{}/{}/videos",
            self.cfg.graph_version, self.cfg.page_id
        );
        let resp = self
            .client
            .post(url)
            .multipart(form)
            .timeout(Duration::from_secs(900))
            .send()
            .await
            .context("Facebook upload request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            logw(format!(
                "Facebook upload failed HTTP {}: {}",
                status.as_u16(),
                raw.chars().take(400).collect::<String>()
            ));
            return Ok(false);
        }

        let Some(video_id) = serde_json::from_str::<UploadResponse>(&raw).ok().and_then(|r| r.id) else {
            logw("Facebook upload returned no video id.");
            return Ok(false);
        };
        logok(format!("Video uploaded: {}", video_id));

        if let Some(comment) = first_comment.filter(|c| !c.trim().is_empty()) {
            if let Err(err) = self.post_comment(&video_id, comment).await {
                logw(format!("First comment failed: {:#}", err));
            }
        }
        Ok(true)
    }
}
