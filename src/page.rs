use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::time::Duration;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// What a title's watch page can tell us.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageAssets {
    pub trailer_url: Option<String>,
    pub overview: Option<String>,
}

#[async_trait]
pub trait WatchPage: Send + Sync {
    async fn inspect(&self, watch_url: &str) -> Result<PageAssets>;
}

pub struct WatchPageScraper {
    client: reqwest::Client,
}

impl WatchPageScraper {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WatchPage for WatchPageScraper {
    async fn inspect(&self, watch_url: &str) -> Result<PageAssets> {
        if watch_url.is_empty() {
            return Ok(PageAssets::default());
        }
        let resp = self
            .client
            .get(watch_url)
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .with_context(|| format!("watch page request failed: {}", watch_url))?;
        if !resp.status().is_success() {
            anyhow::bail!("watch page HTTP {} for {}", resp.status().as_u16(), watch_url);
        }
        let html = resp.text().await.unwrap_or_default();
        Ok(PageAssets {
            trailer_url: extract_trailer_link(&html),
            overview: extract_overview(&html),
        })
    }
}

fn cached(cell: &'static OnceCell<Regex>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_try_init(|| Regex::new(pattern)).ok()
}

fn youtube_regex() -> Option<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    cached(
        &RE,
        r"(?:youtube\.com/embed/|youtube\.com/watch\?v=|youtu\.be/)([A-Za-z0-9_-]+)",
    )
}

fn iframe_src_regex() -> Option<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    cached(&RE, r#"(?is)<iframe\b[^>]*\bsrc\s*=\s*["']([^"']+)["']"#)
}

fn href_regex() -> Option<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    cached(&RE, r#"(?is)<a\b[^>]*\bhref\s*=\s*["']([^"']+)["']"#)
}

fn meta_regex() -> Option<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    cached(
        &RE,
        r#"(?is)<meta\b[^>]*(?:name|property)\s*=\s*["'](?:og:)?description["'][^>]*>"#,
    )
}

fn content_attr_regex() -> Option<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    cached(&RE, r#"(?is)\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
}

fn description_block_regex() -> Option<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    cached(
        &RE,
        r#"(?is)<(div|p|section|span|article)\b[^>]*(?:itemprop\s*=\s*["']description["']|class\s*=\s*["'][^"']*(?:overview|synopsis|story|description)[^"']*["'])[^>]*>"#,
    )
}

fn tag_ends_at(rest: &str, len: usize) -> bool {
    rest[len..].chars().next().is_none_or(|c| !c.is_ascii_alphanumeric())
}

/// Inner HTML of a `name` element whose opening tag ends at `from`. Nested
/// elements of the same name are skipped. `None` when it is never closed.
fn element_inner<'h>(html: &'h str, from: usize, name: &str) -> Option<&'h str> {
    let lower = html[from..].to_ascii_lowercase();
    let open = format!("<{}", name);
    let close = format!("</{}", name);
    let mut depth = 1usize;
    let mut pos = 0;
    while let Some(offset) = lower[pos..].find('<') {
        let at = pos + offset;
        let rest = &lower[at..];
        if rest.starts_with(&close) && tag_ends_at(rest, close.len()) {
            depth -= 1;
            if depth == 0 {
                return Some(&html[from..from + at]);
            }
        } else if rest.starts_with(&open) && tag_ends_at(rest, open.len()) {
            depth += 1;
        }
        pos = at + 1;
    }
    None
}

fn paragraph_regex() -> Option<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    cached(&RE, r"(?is)<p\b[^>]*>(.*?)</p>")
}

fn to_watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

/// First YouTube link on the page, embedded players before plain links.
pub fn extract_trailer_link(html: &str) -> Option<String> {
    let yt = youtube_regex()?;
    for attr_re in [iframe_src_regex()?, href_regex()?] {
        for cap in attr_re.captures_iter(html) {
            if let Some(m) = yt.captures(&cap[1]) {
                return Some(to_watch_url(&m[1]));
            }
        }
    }
    None
}

/// Longest description-like text on the page.
pub fn extract_overview(html: &str) -> Option<String> {
    let mut candidates: Vec<String> = Vec::new();

    if let (Some(meta), Some(content)) = (meta_regex(), content_attr_regex()) {
        for tag in meta.find_iter(html) {
            if let Some(cap) = content.captures(tag.as_str()) {
                if let Some(v) = cap.get(1).or_else(|| cap.get(2)) {
                    candidates.push(decode_entities(v.as_str()));
                }
            }
        }
    }

    if let Some(block) = description_block_regex() {
        for cap in block.captures_iter(html) {
            let (Some(tag), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let name = name.as_str().to_ascii_lowercase();
            if let Some(inner) = element_inner(html, tag.end(), &name) {
                candidates.push(html_to_text_basic(inner));
            }
        }
    }

    if let Some(para) = paragraph_regex() {
        for cap in para.captures_iter(html) {
            let text = html_to_text_basic(&cap[1]);
            if text.chars().count() > 200 {
                candidates.push(text);
            }
        }
    }

    candidates
        .into_iter()
        .map(|t| collapse_whitespace(&t))
        .filter(|t| !t.is_empty())
        .max_by_key(|t| t.chars().count())
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn html_to_text_basic(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    let mut tag = String::new();
    for ch in html.chars() {
        if in_tag {
            if ch == '>' {
                in_tag = false;
                let name = tag.trim_start().to_ascii_lowercase();
                if name.starts_with("br") || name.starts_with("/p") {
                    out.push(' ');
                }
                tag.clear();
            } else {
                tag.push(ch);
            }
            continue;
        }
        if ch == '<' {
            in_tag = true;
            continue;
        }
        out.push(ch);
    }
    decode_entities(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iframe_embed_wins_over_plain_links() {
        let html = r#"
            <a href="https://youtu.be/LINK00001">other</a>
            <iframe width="560" src="https://www.youtube.com/embed/EMBED0001?autoplay=1"></iframe>
        "#;
        assert_eq!(
            extract_trailer_link(html).as_deref(),
            Some("https://www.youtube.com/watch?v=EMBED0001")
        );
    }

    #[test]
    fn falls_back_to_anchor_links() {
        let html = r#"<div><a class="btn" href="https://www.youtube.com/watch?v=abc_DEF-123">Trailer</a></div>"#;
        assert_eq!(
            extract_trailer_link(html).as_deref(),
            Some("https://www.youtube.com/watch?v=abc_DEF-123")
        );
        assert!(extract_trailer_link("<p>no video here</p>").is_none());
    }

    #[test]
    fn picks_longest_description_candidate() {
        let long = "A retired thief is pulled back for one last job. ".repeat(6);
        let html = format!(
            r#"<head><meta name="description" content="Short &amp; sweet"></head>
               <body><div class="movie-synopsis"><span>{}</span></div></body>"#,
            long
        );
        let overview = extract_overview(&html).unwrap();
        assert!(overview.starts_with("A retired thief"));
        assert!(!overview.contains("<span>"));
    }

    #[test]
    fn meta_description_is_decoded() {
        let html = r#"<meta property="og:description" content="Tom &amp; Jerry return">"#;
        assert_eq!(extract_overview(html).as_deref(), Some("Tom & Jerry return"));
    }

    #[test]
    fn nested_markup_keeps_the_whole_synopsis() {
        let html = r#"<div class="story"><p>A crew of thieves.</p> <div>They plan <b>one</b> last job.</div> Then it all goes wrong.</div><div>footer</div>"#;
        assert_eq!(
            extract_overview(html).as_deref(),
            Some("A crew of thieves. They plan one last job. Then it all goes wrong.")
        );
    }

    #[test]
    fn unclosed_synopsis_block_is_skipped() {
        assert!(extract_overview(r#"<div class="overview">dangling"#).is_none());
    }

    #[test]
    fn short_paragraphs_are_ignored() {
        assert!(extract_overview("<p>tiny</p>").is_none());
    }
}
