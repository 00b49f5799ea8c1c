use crate::logw;
use crate::models::ContentKind;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const TMDB_API: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

/// Popularity and descriptive data for one title.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub popularity: f64,
    pub genre_ids: Vec<u32>,
    pub overview: String,
    pub poster_path: Option<String>,
    pub external_id: Option<u64>,
}

impl Metadata {
    pub fn poster_url(&self) -> Option<String> {
        self.poster_path
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}/w500{}", TMDB_IMAGE_BASE, p))
    }
}

#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Best match for `title`, or `None` when nothing matched.
    async fn lookup(&self, title: &str, kind: ContentKind) -> Result<Option<Metadata>>;

    /// Backdrop and poster image URLs, backdrops first.
    async fn images(&self, external_id: u64, kind: ContentKind) -> Result<Vec<String>>;

    /// Official trailer on YouTube, when listed.
    async fn trailer_url(&self, external_id: u64, kind: ContentKind) -> Result<Option<String>>;
}

pub struct TmdbClient {
    client: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: u64,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    genre_ids: Vec<u32>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImagesPage {
    #[serde(default)]
    backdrops: Vec<ImageEntry>,
    #[serde(default)]
    posters: Vec<ImageEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    file_path: String,
}

#[derive(Debug, Default, Deserialize)]
struct VideosPage {
    #[serde(default)]
    results: Vec<VideoEntry>,
}

#[derive(Debug, Deserialize)]
struct VideoEntry {
    #[serde(default)]
    site: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    key: String,
}

impl TmdbClient {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
        }
    }

    fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .with_context(|| format!("TMDB request failed: {}", url))?;
        if !resp.status().is_success() {
            anyhow::bail!("TMDB HTTP {} for {}", resp.status().as_u16(), url);
        }
        resp.json().await.with_context(|| format!("TMDB response parse failed: {}", url))
    }
}

fn first_match(page: SearchPage) -> Option<Metadata> {
    page.results.into_iter().next().map(|best| Metadata {
        popularity: best.popularity,
        genre_ids: best.genre_ids,
        overview: best.overview.unwrap_or_default(),
        poster_path: best.poster_path,
        external_id: Some(best.id),
    })
}

fn image_urls(page: ImagesPage) -> Vec<String> {
    page.backdrops
        .iter()
        .map(|img| format!("{}/w1280{}", TMDB_IMAGE_BASE, img.file_path))
        .chain(
            page.posters
                .iter()
                .map(|img| format!("{}/w780{}", TMDB_IMAGE_BASE, img.file_path)),
        )
        .collect()
}

fn youtube_trailer(page: VideosPage) -> Option<String> {
    page.results
        .into_iter()
        .find(|v| v.site == "YouTube" && v.kind == "Trailer" && !v.key.is_empty())
        .map(|v| format!("https://www.youtube.com/watch?v={}", v.key))
}

#[async_trait]
impl MetadataService for TmdbClient {
    async fn lookup(&self, title: &str, kind: ContentKind) -> Result<Option<Metadata>> {
        if !self.enabled() {
            return Ok(None);
        }
        let url = format!("{}/search/{}", TMDB_API, kind.path_segment());
        let page: SearchPage = self.get_json(&url, &[("query", title)]).await?;
        let found = first_match(page);
        if found.is_none() {
            logw(format!("TMDB: no match for '{}' ({})", title, kind));
        }
        Ok(found)
    }

    async fn images(&self, external_id: u64, kind: ContentKind) -> Result<Vec<String>> {
        if !self.enabled() {
            return Ok(Vec::new());
        }
        let url = format!("{}/{}/{}/images", TMDB_API, kind.path_segment(), external_id);
        let page: ImagesPage = self.get_json(&url, &[]).await?;
        Ok(image_urls(page))
    }

    async fn trailer_url(&self, external_id: u64, kind: ContentKind) -> Result<Option<String>> {
        if !self.enabled() {
            return Ok(None);
        }
        let url = format!("{}/{}/{}/videos", TMDB_API, kind.path_segment(), external_id);
        let page: VideosPage = self.get_json(&url, &[]).await?;
        Ok(youtube_trailer(page))
    }
}
