use crate::config::CatalogConfig;
use crate::models::{ContentItem, ContentKind};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Remote or local list of recently added titles.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn name(&self) -> &str;

    async fn list_recent(&self, kind: ContentKind) -> Result<Vec<ContentItem>>;
}

/// Collects both kinds from `primary`, dropping already-posted ids. When that
/// yields nothing, the same is done with `fallback`. A failing source counts as
/// "no candidates".
pub async fn gather_candidates(
    primary: &dyn CatalogSource,
    fallback: Option<&dyn CatalogSource>,
    posted: &BTreeSet<String>,
) -> Vec<ContentItem> {
    let items = collect_unposted(primary, posted).await;
    if !items.is_empty() {
        logok(format!("Retrieved {} new items from {}.", items.len(), primary.name()));
        return items;
    }

    match fallback {
        Some(source) => {
            logw(format!(
                "{} yielded no new items; falling back to {}.",
                primary.name(),
                source.name()
            ));
            let items = collect_unposted(source, posted).await;
            logi(format!("Retrieved {} new items from {}.", items.len(), source.name()));
            items
        }
        None => Vec::new(),
    }
}

async fn collect_unposted(source: &dyn CatalogSource, posted: &BTreeSet<String>) -> Vec<ContentItem> {
    let mut out = Vec::new();
    for kind in [ContentKind::Movie, ContentKind::Series] {
        match source.list_recent(kind).await {
            Ok(items) => out.extend(items.into_iter().filter(|item| !posted.contains(&item.id))),
            Err(err) => logw(format!("{} listing for {} failed: {:#}", source.name(), kind, err)),
        }
    }
    out
}

/// Supabase (PostgREST) backend of the watch site.
pub struct SupabaseCatalog {
    client: Client,
    cfg: CatalogConfig,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: serde_json::Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    arabic_title: Option<String>,
    #[serde(default)]
    trailer_url: Option<String>,
}

impl SupabaseCatalog {
    pub fn new(client: Client, cfg: CatalogConfig) -> Self {
        Self { client, cfg }
    }

    fn table_query(&self, kind: ContentKind) -> (String, &'static str, usize) {
        match kind {
            ContentKind::Movie => (
                format!("{}/rest/v1/movies", self.cfg.supabase_url.trim_end_matches('/')),
                "id,title,arabic_title,trailer_url",
                self.cfg.movie_limit,
            ),
            ContentKind::Series => (
                format!("{}/rest/v1/series", self.cfg.supabase_url.trim_end_matches('/')),
                "id,title",
                self.cfg.series_limit,
            ),
        }
    }
}

fn id_to_string(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn row_to_item(row: CatalogRow, kind: ContentKind, site_base_url: &str) -> Option<ContentItem> {
    let id = id_to_string(&row.id)?;
    let title = non_empty(row.title)
        .or_else(|| non_empty(row.arabic_title))
        .unwrap_or_else(|| format!("{} {}", kind, id));

    let mut item = ContentItem::new(id.clone(), title, kind);
    item.watch_url = format!(
        "{}/watch/{}/{}",
        site_base_url.trim_end_matches('/'),
        match kind {
            ContentKind::Movie => "movie",
            ContentKind::Series => "series",
        },
        id
    );
    item.trailer_url = non_empty(row.trailer_url);
    Some(item)
}

#[async_trait]
impl CatalogSource for SupabaseCatalog {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn list_recent(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        if self.cfg.supabase_url.is_empty() || self.cfg.supabase_key.is_empty() {
            anyhow::bail!("supabase credentials not configured");
        }

        let (url, select, limit) = self.table_query(kind);
        let limit = limit.to_string();
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("select", select),
                ("order", "created_at.desc"),
                ("limit", limit.as_str()),
            ])
            .header("apikey", &self.cfg.supabase_key)
            .bearer_auth(&self.cfg.supabase_key)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .with_context(|| format!("Supabase request failed: {}", url))?;

        if !resp.status().is_success() {
            anyhow::bail!("Supabase HTTP {} for {}", resp.status().as_u16(), url);
        }

        let rows: Vec<CatalogRow> = resp.json().await.context("Supabase response parse failed")?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row_to_item(row, kind, &self.cfg.site_base_url))
            .collect())
    }
}

/// Operator-maintained `catalog.csv` with a `Title,Type,Watch_URL` header.
/// Rows carry no catalog id, so the watch URL (or the title) stands in for it.
pub struct CsvCatalog {
    path: PathBuf,
}

impl CsvCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Splits CSV text into records. Quoted fields may hold commas, doubled
/// quotes and line breaks. Blank records are dropped.
fn csv_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.trim_start_matches('\u{feff}').chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => record.push(std::mem::take(&mut field)),
            '\r' if !quoted => {}
            '\n' if !quoted => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
        .into_iter()
        .map(|r| r.into_iter().map(|f| f.trim().to_string()).collect::<Vec<_>>())
        .filter(|r| r.iter().any(|f| !f.is_empty()))
        .collect()
}

pub fn parse_catalog_csv(text: &str) -> Vec<ContentItem> {
    let mut records = csv_records(text).into_iter();
    let Some(header) = records.next() else {
        return Vec::new();
    };
    let col = |name: &str| header.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(title_col), Some(type_col)) = (col("Title"), col("Type")) else {
        logw("catalog.csv is missing a Title or Type column");
        return Vec::new();
    };
    let watch_col = col("Watch_URL");

    let mut out = Vec::new();
    for fields in records {
        let title = match fields.get(title_col) {
            Some(t) if !t.is_empty() => t.clone(),
            _ => continue,
        };
        let Some(kind) = fields.get(type_col).and_then(|t| ContentKind::parse(t)) else {
            continue;
        };
        let watch_url = watch_col
            .and_then(|c| fields.get(c))
            .cloned()
            .unwrap_or_default();
        let id = if watch_url.is_empty() {
            title.clone()
        } else {
            watch_url.clone()
        };
        let mut item = ContentItem::new(id, title, kind);
        item.watch_url = watch_url;
        out.push(item);
    }
    out
}

#[async_trait]
impl CatalogSource for CsvCatalog {
    fn name(&self) -> &str {
        "catalog.csv"
    }

    async fn list_recent(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", self.path.display()));
            }
        };
        Ok(parse_catalog_csv(&text)
            .into_iter()
            .filter(|item| item.kind == kind)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        items: Vec<ContentItem>,
        fail: bool,
    }

    #[async_trait]
    impl CatalogSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn list_recent(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(self.items.iter().filter(|i| i.kind == kind).cloned().collect())
        }
    }

    fn item(id: &str, kind: ContentKind) -> ContentItem {
        ContentItem::new(id, format!("Title {id}"), kind)
    }

    #[tokio::test]
    async fn posted_ids_are_filtered_out() {
        let source = FixedSource {
            items: vec![item("1", ContentKind::Movie), item("2", ContentKind::Series), item("3", ContentKind::Movie)],
            fail: false,
        };
        let posted: BTreeSet<String> = ["3".to_string()].into_iter().collect();
        let got = gather_candidates(&source, None, &posted).await;
        let ids: Vec<&str> = got.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn connectivity_error_means_no_candidates() {
        let source = FixedSource { items: vec![], fail: true };
        assert!(gather_candidates(&source, None, &BTreeSet::new()).await.is_empty());
    }

    #[tokio::test]
    async fn fallback_is_used_only_when_primary_is_empty() {
        let broken = FixedSource { items: vec![], fail: true };
        let local = FixedSource { items: vec![item("local", ContentKind::Movie)], fail: false };
        let got = gather_candidates(&broken, Some(&local as &dyn CatalogSource), &BTreeSet::new()).await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "local");

        let remote = FixedSource { items: vec![item("remote", ContentKind::Series)], fail: false };
        let got = gather_candidates(&remote, Some(&local as &dyn CatalogSource), &BTreeSet::new()).await;
        assert_eq!(got[0].id, "remote");
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn supabase_rows_map_to_items() {
        let row: CatalogRow = serde_json::from_str(
            r#"{"id": 512, "title": "", "arabic_title": "الفيلم", "trailer_url": "https://youtu.be/abc"}"#,
        )
        .unwrap();
        let item = row_to_item(row, ContentKind::Movie, "https://site.example/").unwrap();
        assert_eq!(item.id, "512");
        assert_eq!(item.title, "الفيلم");
        assert_eq!(item.watch_url, "https://site.example/watch/movie/512");
        assert_eq!(item.trailer_url.as_deref(), Some("https://youtu.be/abc"));

        let row: CatalogRow = serde_json::from_str(r#"{"id": "s-9"}"#).unwrap();
        let item = row_to_item(row, ContentKind::Series, "https://site.example").unwrap();
        assert_eq!(item.title, "Series s-9");
        assert_eq!(item.watch_url, "https://site.example/watch/series/s-9");
    }

    #[test]
    fn csv_catalog_parses_quoted_fields_and_skips_bad_rows() {
        let text = "Title,Type,Watch_URL\n\"Dune, Part Two\",Movie,https://w/1\nBroken,Unknown,https://w/2\nShogun,Series,\n";
        let items = parse_catalog_csv(text);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Dune, Part Two");
        assert_eq!(items[0].id, "https://w/1");
        assert_eq!(items[1].kind, ContentKind::Series);
        assert_eq!(items[1].id, "Shogun");
    }

    #[test]
    fn csv_catalog_keeps_rows_after_a_multiline_field() {
        let text = "\u{feff}Title,Type,Watch_URL\r\n\"Heat\nDirector's Cut\",Movie,https://w/1\r\n\r\nDark,Series,https://w/2\r\n";
        let items = parse_catalog_csv(text);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Heat\nDirector's Cut");
        assert_eq!(items[1].title, "Dark");
        assert_eq!(items[1].kind, ContentKind::Series);
        assert_eq!(items[1].watch_url, "https://w/2");
    }
}
