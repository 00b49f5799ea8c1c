//! Secondary "filler" footage from a fixed pool of reusable sources.
//!
//! Each source is consumed front to back: the queue record remembers how many
//! seconds of every URL were already used, and retires a URL once what is left
//! is shorter than one clip.

use crate::state::{JsonStore, ViralQueueState};
use crate::{logi, logok, logw};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

#[async_trait]
pub trait ClipSource: Send + Sync {
    /// Total length of the source in seconds.
    async fn duration(&self, url: &str) -> Result<f64>;

    /// Downloads `[start, start + seconds)` of the source into `dest_dir`.
    async fn extract(&self, url: &str, start: u64, seconds: u64, dest_dir: &Path) -> Result<PathBuf>;
}

fn has_url_scheme(line: &str) -> bool {
    match line.split_once("://") {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && !rest.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
        }
        None => false,
    }
}

/// Candidate URLs in file order. A missing file is an empty pool.
pub async fn load_links(path: &Path) -> Result<Vec<String>> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut links: Vec<String> = Vec::new();
    for line in text.lines().map(str::trim) {
        if has_url_scheme(line) && !links.iter().any(|l| l == line) {
            links.push(line.to_string());
        }
    }
    Ok(links)
}

pub struct FillerResolver<'a> {
    source: &'a dyn ClipSource,
    store: JsonStore<ViralQueueState>,
    links_file: PathBuf,
    work_dir: PathBuf,
}

impl<'a> FillerResolver<'a> {
    pub fn new(
        source: &'a dyn ClipSource,
        store: JsonStore<ViralQueueState>,
        links_file: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            store,
            links_file: links_file.into(),
            work_dir: work_dir.into(),
        }
    }

    /// A fresh clip of `target_secs`, or `None` when the pool has nothing left.
    /// Errors only when the queue record cannot be read or written.
    pub async fn resolve_filler_clip(&self, target_secs: u64) -> Result<Option<PathBuf>> {
        let mut queue = self.store.load_or_default().await?;
        let links = load_links(&self.links_file).await?;
        let available: Vec<String> = links
            .into_iter()
            .filter(|url| !queue.is_blacklisted(url))
            .collect();

        if available.is_empty() {
            logw("No filler sources available (pool empty or fully retired).");
            return Ok(None);
        }

        for url in available {
            let used = queue.used_seconds(&url);
            let total = match self.source.duration(&url).await {
                Ok(total) => total,
                Err(err) => {
                    logw(format!("Filler duration probe failed for {}: {:#}", url, err));
                    continue;
                }
            };

            if total - (used as f64) < target_secs as f64 {
                logi(format!(
                    "Filler source exhausted ({}s used of {:.0}s), retiring: {}",
                    used, total, url
                ));
                queue.retire(&url);
                self.store.save(&queue).await?;
                continue;
            }

            match self.source.extract(&url, used, target_secs, &self.work_dir).await {
                Ok(path) => {
                    queue.consume(&url, target_secs);
                    self.store.save(&queue).await?;
                    logok(format!(
                        "Filler clip {}s-{}s from {}",
                        used,
                        used + target_secs,
                        url
                    ));
                    return Ok(Some(path));
                }
                Err(err) => {
                    logw(format!("Filler extraction failed for {}: {:#}", url, err));
                }
            }
        }

        logw("Every filler source failed or ran out this cycle.");
        Ok(None)
    }
}
