//! Primary video acquisition through ordered fallback tiers.
//!
//! Tier 1 downloads the official trailer (retried with backoff), tier 2 tries
//! stock footage queries once each, tier 3 builds a pan/zoom slideshow from
//! stills. A tier is abandoned only after its own policy is spent, and there is
//! no going back to an earlier tier.

use crate::error::AssetError;
use crate::metadata::MetadataService;
use crate::models::ContentItem;
use crate::retry::{RetryPolicy, with_retry};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetTier {
    Trailer,
    Stock,
    Slideshow,
}

impl fmt::Display for AssetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trailer => "tier 1 (trailer)",
            Self::Stock => "tier 2 (stock footage)",
            Self::Slideshow => "tier 3 (slideshow)",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetResolution {
    pub path: PathBuf,
    pub tier: AssetTier,
}

/// Where the video-fetch collaborator should look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    Url(String),
    Search(String),
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::Search(query) => write!(f, "search \"{}\"", query),
        }
    }
}

#[async_trait]
pub trait VideoFetcher: Send + Sync {
    async fn download(&self, target: &FetchTarget, dest_dir: &Path) -> Result<PathBuf>;
}

#[async_trait]
pub trait StockFootage: Send + Sync {
    /// `Ok(None)` when the query has no usable clip.
    async fn fetch(&self, query: &str, dest_dir: &Path) -> Result<Option<PathBuf>>;
}

#[async_trait]
pub trait SlideshowBuilder: Send + Sync {
    /// `Ok(None)` when none of `images` could be used.
    async fn build(&self, images: &[String], target_secs: f64, dest_dir: &Path) -> Result<Option<PathBuf>>;
}

/// Rejects missing files and files under `min_bytes`.
pub async fn validate_download(path: &Path, min_bytes: u64) -> Result<()> {
    let meta = fs::metadata(path)
        .await
        .with_context(|| format!("downloaded file missing: {}", path.display()))?;
    if meta.len() < min_bytes {
        anyhow::bail!(
            "downloaded file too small ({} bytes < {}): {}",
            meta.len(),
            min_bytes,
            path.display()
        );
    }
    Ok(())
}

pub struct AssetResolver<'a> {
    fetcher: &'a dyn VideoFetcher,
    stock: &'a dyn StockFootage,
    metadata: &'a dyn MetadataService,
    slideshow: &'a dyn SlideshowBuilder,
    retry: RetryPolicy,
    min_file_bytes: u64,
    generic_queries: Vec<String>,
    work_dir: PathBuf,
}

impl<'a> AssetResolver<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: &'a dyn VideoFetcher,
        stock: &'a dyn StockFootage,
        metadata: &'a dyn MetadataService,
        slideshow: &'a dyn SlideshowBuilder,
        retry: RetryPolicy,
        min_file_bytes: u64,
        generic_queries: Vec<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            stock,
            metadata,
            slideshow,
            retry,
            min_file_bytes,
            generic_queries,
            work_dir: work_dir.into(),
        }
    }

    pub async fn resolve_primary_video(
        &self,
        item: &ContentItem,
        target_secs: f64,
    ) -> Result<AssetResolution, AssetError> {
        match self.trailer_tier(item).await {
            Ok(path) => return Ok(self.resolved(path, AssetTier::Trailer)),
            Err(err) => logw(format!("{} exhausted for {}: {:#}", AssetTier::Trailer, item.title, err)),
        }

        match self.stock_tier(item).await {
            Some(path) => return Ok(self.resolved(path, AssetTier::Stock)),
            None => logw(format!("{} exhausted for {}", AssetTier::Stock, item.title)),
        }

        match self.slideshow_tier(item, target_secs).await {
            Some(path) => Ok(self.resolved(path, AssetTier::Slideshow)),
            None => Err(AssetError::Unavailable {
                title: item.title.clone(),
            }),
        }
    }

    fn resolved(&self, path: PathBuf, tier: AssetTier) -> AssetResolution {
        logok(format!("Primary video from {}: {}", tier, path.display()));
        AssetResolution { path, tier }
    }

    fn trailer_target(item: &ContentItem) -> FetchTarget {
        match item.trailer_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => FetchTarget::Url(url.to_string()),
            None => FetchTarget::Search(format!("{} official trailer", item.title)),
        }
    }

    async fn trailer_tier(&self, item: &ContentItem) -> Result<PathBuf> {
        let target = Self::trailer_target(item);
        let dest = self.work_dir.join("trailer");
        logi(format!("{}: fetching {}", AssetTier::Trailer, target));
        let (target, dest) = (&target, &dest);
        with_retry(&self.retry, "trailer download", move |attempt| async move {
            logi(format!("Trailer attempt {}/{}", attempt, self.retry.attempts));
            let path = self.fetcher.download(target, dest).await?;
            validate_download(&path, self.min_file_bytes).await?;
            Ok(path)
        })
        .await
    }

    fn stock_queries(&self, item: &ContentItem) -> Vec<String> {
        let mut queries = vec![item.title.clone(), format!("{} cinematic", item.title)];
        queries.extend(self.generic_queries.iter().cloned());
        queries.retain(|q| !q.trim().is_empty());
        queries.dedup();
        queries
    }

    async fn stock_tier(&self, item: &ContentItem) -> Option<PathBuf> {
        let dest = self.work_dir.join("stock");
        for query in self.stock_queries(item) {
            logi(format!("{}: query \"{}\"", AssetTier::Stock, query));
            match self.stock.fetch(&query, &dest).await {
                Ok(Some(path)) => match validate_download(&path, self.min_file_bytes).await {
                    Ok(()) => return Some(path),
                    Err(err) => logw(format!("Stock clip rejected: {:#}", err)),
                },
                Ok(None) => logw(format!("No stock clip for \"{}\"", query)),
                Err(err) => logw(format!("Stock search \"{}\" failed: {:#}", query, err)),
            }
        }
        None
    }

    async fn slideshow_tier(&self, item: &ContentItem, target_secs: f64) -> Option<PathBuf> {
        let mut images = Vec::new();
        if let Some(id) = item.external_id {
            match self.metadata.images(id, item.kind).await {
                Ok(urls) => images.extend(urls),
                Err(err) => logw(format!("Image lookup failed for {}: {:#}", item.title, err)),
            }
        }
        if let Some(poster) = item.poster_url.as_ref() {
            if !images.contains(poster) {
                images.push(poster.clone());
            }
        }

        if images.is_empty() {
            logw(format!("{}: no images for {}", AssetTier::Slideshow, item.title));
            return None;
        }

        logi(format!(
            "{}: building from {} images for {:.1}s",
            AssetTier::Slideshow,
            images.len(),
            target_secs
        ));
        let dest = self.work_dir.join("slideshow");
        match self.slideshow.build(&images, target_secs, &dest).await {
            Ok(Some(path)) => Some(path),
            Ok(None) => {
                logw(format!("{}: zero usable images for {}", AssetTier::Slideshow, item.title));
                None
            }
            Err(err) => {
                logw(format!("{}: build failed: {:#}", AssetTier::Slideshow, err));
                None
            }
        }
    }
}
