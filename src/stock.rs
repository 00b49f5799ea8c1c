use crate::logi;
use crate::resolver::StockFootage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const PEXELS_SEARCH: &str = "https://api.pexels.com/videos/search";

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: u64,
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    link: String,
    #[serde(default)]
    file_type: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Best mp4 rendition of the first portrait video, preferring widths close
/// to 1080 without going over.
fn pick_file(page: &SearchPage) -> Option<(u64, String)> {
    for video in &page.videos {
        let mut files: Vec<&VideoFile> = video
            .video_files
            .iter()
            .filter(|f| f.file_type == "video/mp4")
            .filter(|f| match (f.width, f.height) {
                (Some(w), Some(h)) => h >= w,
                _ => true,
            })
            .collect();
        files.sort_by_key(|f| {
            let w = f.width.unwrap_or(0);
            if w <= 1080 { 1080 - w } else { w }
        });
        if let Some(file) = files.first() {
            return Some((video.id, file.link.clone()));
        }
    }
    None
}

pub struct PexelsStock {
    client: Client,
    api_key: String,
}

impl PexelsStock {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl StockFootage for PexelsStock {
    async fn fetch(&self, query: &str, dest_dir: &Path) -> Result<Option<PathBuf>> {
        if self.api_key.is_empty() {
            return Ok(None);
        }

        let resp = self
            .client
            .get(PEXELS_SEARCH)
            .header("Authorization", &self.api_key)
            .query(&[("query", query), ("orientation", "portrait"), ("per_page", "5")])
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .context("Pexels search failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("Pexels HTTP {}", resp.status().as_u16());
        }
        let page: SearchPage = resp.json().await.context("Pexels response parse failed")?;

        let Some((id, link)) = pick_file(&page) else {
            return Ok(None);
        };

        logi(format!("Downloading stock clip {} for \"{}\"", id, query));
        let bytes = self
            .client
            .get(&link)
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .context("stock clip download failed")?
            .error_for_status()?
            .bytes()
            .await?;

        fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(format!("pexels_{}.mp4", id));
        fs::write(&path, &bytes).await?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_portrait_mp4_near_target_width() {
        let page: SearchPage = serde_json::from_str(
            r#"{"videos": [{"id": 5, "video_files": [
                {"link": "https://v/land.mp4", "file_type": "video/mp4", "width": 1920, "height": 1080},
                {"link": "https://v/small.mp4", "file_type": "video/mp4", "width": 540, "height": 960},
                {"link": "https://v/hd.mp4", "file_type": "video/mp4", "width": 1080, "height": 1920},
                {"link": "https://v/hd.webm", "file_type": "video/webm", "width": 1080, "height": 1920}
            ]}]}"#,
        )
        .unwrap();
        assert_eq!(pick_file(&page), Some((5, "https://v/hd.mp4".to_string())));
    }

    #[test]
    fn landscape_only_results_are_skipped() {
        let page: SearchPage = serde_json::from_str(
            r#"{"videos": [
                {"id": 1, "video_files": [{"link": "https://v/a.mp4", "file_type": "video/mp4", "width": 1920, "height": 1080}]},
                {"id": 2, "video_files": [{"link": "https://v/b.mp4", "file_type": "video/mp4", "width": 720, "height": 1280}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(pick_file(&page), Some((2, "https://v/b.mp4".to_string())));
        assert!(pick_file(&SearchPage { videos: vec![] }).is_none());
    }

    #[tokio::test]
    async fn missing_key_means_no_footage() {
        let stock = PexelsStock::new(Client::new(), "");
        let dir = tempfile::TempDir::new().unwrap();
        assert!(stock.fetch("ocean", dir.path()).await.unwrap().is_none());
    }
}
