//! yt-dlp wrapper: trailer downloads through a ladder of client profiles, and
//! section extraction for filler clips.

use crate::filler::ClipSource;
use crate::resolver::{FetchTarget, VideoFetcher};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

const UA_IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
const UA_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

const VIDEO_EXTS: [&str; 4] = ["mp4", "webm", "mkv", "3gp"];

/// Cookies files at or below this size are treated as absent.
const MIN_COOKIES_BYTES: u64 = 100;

#[derive(Debug, Clone)]
struct Profile {
    name: &'static str,
    args: Vec<String>,
    requires_cookies: bool,
    use_watch_url: bool,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn profiles(cookies: &str) -> Vec<Profile> {
    vec![
        Profile {
            name: "ipad-safari",
            args: strings(&["--user-agent", UA_IPAD, "-f", "18/worst[ext=mp4]/worst"]),
            requires_cookies: false,
            use_watch_url: false,
        },
        Profile {
            name: "iphone-safari",
            args: strings(&["--user-agent", UA_IPHONE, "-f", "18/worst[ext=mp4]/worst"]),
            requires_cookies: false,
            use_watch_url: false,
        },
        Profile {
            name: "ipad-ios-client",
            args: strings(&[
                "--user-agent",
                UA_IPAD,
                "--extractor-args",
                "youtube:player_client=ios",
                "-f",
                "18/worst",
            ]),
            requires_cookies: false,
            use_watch_url: false,
        },
        Profile {
            name: "ipad-watch-url",
            args: strings(&["--user-agent", UA_IPAD, "-f", "18/worst[ext=mp4]/worst"]),
            requires_cookies: false,
            use_watch_url: true,
        },
        Profile {
            name: "cookies-ipad",
            args: strings(&["--cookies", cookies, "--user-agent", UA_IPAD, "-f", "18/worst"]),
            requires_cookies: true,
            use_watch_url: false,
        },
        Profile {
            name: "cookies-only",
            args: strings(&["--cookies", cookies, "-f", "worst"]),
            requires_cookies: true,
            use_watch_url: false,
        },
    ]
}

fn video_id_regex() -> Option<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| Regex::new(r"(?:v=|youtu\.be/|shorts/)([a-zA-Z0-9_-]{11})"))
        .ok()
}

/// Stable short id for a URL, used to name output files.
pub fn video_id(url: &str) -> String {
    if let Some(cap) = video_id_regex().and_then(|re| re.captures(url)) {
        return cap[1].to_string();
    }
    let tail = url.rsplit('/').next().unwrap_or(url);
    let tail = tail.split('?').next().unwrap_or(tail);
    let slug: String = tail
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(40)
        .collect();
    if slug.is_empty() { "video".to_string() } else { slug }
}

/// Largest video file in `dir` whose name starts with `prefix`.
async fn find_output(dir: &Path, prefix: &str, min_bytes: u64) -> Result<Option<PathBuf>> {
    let mut best: Option<(u64, PathBuf)> = None;
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| VIDEO_EXTS.contains(&e));
        if !name.starts_with(prefix) || !ext_ok {
            continue;
        }
        let size = entry.metadata().await?.len();
        if size >= min_bytes && best.as_ref().is_none_or(|(s, _)| size > *s) {
            best = Some((size, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

pub struct YtDlpFetcher {
    cookies_file: PathBuf,
    timeout: Duration,
    min_file_bytes: u64,
    profile_delay: Duration,
}

impl YtDlpFetcher {
    pub fn new(cookies_file: impl Into<PathBuf>, timeout: Duration, min_file_bytes: u64, profile_delay: Duration) -> Self {
        Self {
            cookies_file: cookies_file.into(),
            timeout,
            min_file_bytes,
            profile_delay,
        }
    }

    async fn has_cookies(&self) -> bool {
        fs::metadata(&self.cookies_file)
            .await
            .map(|m| m.len() > MIN_COOKIES_BYTES)
            .unwrap_or(false)
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output> {
        let mut cmd = Command::new("yt-dlp");
        cmd.args(args).kill_on_drop(true);
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => output.context("yt-dlp execution failed"),
            Err(_) => anyhow::bail!("yt-dlp timed out after {}s", self.timeout.as_secs()),
        }
    }
}

#[async_trait]
impl VideoFetcher for YtDlpFetcher {
    async fn download(&self, target: &FetchTarget, dest_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest_dir).await?;
        let (url, id) = match target {
            FetchTarget::Url(url) => (url.clone(), video_id(url)),
            FetchTarget::Search(query) => (format!("ytsearch1:{}", query), video_id(query)),
        };
        let has_cookies = self.has_cookies().await;
        let cookies = self.cookies_file.display().to_string();
        let ladder = profiles(&cookies);

        for (i, profile) in ladder.iter().enumerate() {
            if profile.requires_cookies && !has_cookies {
                continue;
            }
            let target_url = match (profile.use_watch_url, target) {
                (true, FetchTarget::Url(_)) => format!("https://www.youtube.com/watch?v={}", id),
                (true, FetchTarget::Search(_)) => continue,
                (false, _) => url.clone(),
            };

            let prefix = format!("yt_{}_{}", id, i);
            let template = dest_dir.join(format!("{}.%(ext)s", prefix));
            let mut args = vec![
                target_url,
                "-o".to_string(),
                template.display().to_string(),
                "--no-playlist".to_string(),
                "--quiet".to_string(),
                "--no-warnings".to_string(),
            ];
            args.extend(profile.args.iter().cloned());

            logi(format!("yt-dlp [{}/{}] {}", i + 1, ladder.len(), profile.name));
            match self.run(&args).await {
                Ok(out) if out.status.success() => {
                    if let Some(path) = find_output(dest_dir, &prefix, self.min_file_bytes).await? {
                        logok(format!("yt-dlp profile {} succeeded: {}", profile.name, path.display()));
                        return Ok(path);
                    }
                    logw(format!("yt-dlp profile {} finished without a usable file", profile.name));
                }
                Ok(out) => logw(format!(
                    "yt-dlp profile {} failed ({}): {}",
                    profile.name,
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                )),
                Err(err) => logw(format!("yt-dlp profile {}: {:#}", profile.name, err)),
            }

            tokio::time::sleep(self.profile_delay).await;
        }

        anyhow::bail!("every yt-dlp profile failed for {}", target)
    }
}

#[async_trait]
impl ClipSource for YtDlpFetcher {
    async fn duration(&self, url: &str) -> Result<f64> {
        let args = strings(&["--print", "duration", "--skip-download", "--no-playlist", "--no-warnings", url]);
        let out = self.run(&args).await?;
        if !out.status.success() {
            anyhow::bail!("yt-dlp could not read duration for {}", url);
        }
        let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
        text.lines()
            .next()
            .and_then(|l| l.trim().parse::<f64>().ok())
            .filter(|d| *d > 0.0)
            .with_context(|| format!("unparseable duration '{}' for {}", text, url))
    }

    async fn extract(&self, url: &str, start: u64, seconds: u64, dest_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest_dir).await?;
        let prefix = format!("filler_{}_{}", video_id(url), start);
        let template = dest_dir.join(format!("{}.%(ext)s", prefix));
        let mut args = vec![
            url.to_string(),
            "-o".to_string(),
            template.display().to_string(),
            "--download-sections".to_string(),
            format!("*{}-{}", start, start + seconds),
            "--force-keyframes-at-cuts".to_string(),
            "--no-playlist".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            "best[ext=mp4]/best".to_string(),
        ];
        if self.has_cookies().await {
            args.push("--cookies".to_string());
            args.push(self.cookies_file.display().to_string());
        }

        let out = self.run(&args).await?;
        if !out.status.success() {
            anyhow::bail!(
                "yt-dlp section download failed for {}: {}",
                url,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        find_output(dest_dir, &prefix, self.min_file_bytes)
            .await?
            .with_context(|| format!("no filler clip written for {}", url))
    }
}
