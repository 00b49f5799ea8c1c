use crate::config::RenderConfig;
use crate::resolver::SlideshowBuilder;
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

/// Images below this size are treated as broken downloads.
const MIN_IMAGE_BYTES: u64 = 1024;
const KEN_BURNS_ZOOM: f64 = 1.3;

pub(crate) async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd
        .status()
        .await
        .with_context(|| format!("Command execution failed: {}", args[0]))?;
    if !status.success() {
        anyhow::bail!("Command failed ({}): {:?}", status, args);
    }

    Ok(())
}

fn ffmpeg_base() -> Vec<String> {
    ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn h264_output(out: &Path) -> Vec<String> {
    [
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        "-preset",
        "veryfast",
        "-crf",
        "22",
        "-c:a",
        "aac",
        "-b:a",
        "192k",
        "-movflags",
        "+faststart",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(out.display().to_string()))
    .collect()
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe failed for {}", path.display());
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        anyhow::bail!("Invalid duration '{}' for {}", text, path.display());
    }
    Ok(duration)
}

/// Path of `path` as the concat demuxer will see it from a list file in
/// `list_dir`. Relative entries are resolved against the list's directory,
/// not the working directory.
fn concat_entry(path: &Path, list_dir: &Path) -> PathBuf {
    let target = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let base = std::path::absolute(list_dir).unwrap_or_else(|_| list_dir.to_path_buf());
    pathdiff::diff_paths(&target, &base).unwrap_or(target)
}

/// Body of an ffmpeg concat-demuxer list file that will live in `list_dir`.
pub fn concat_list_contents(paths: &[PathBuf], list_dir: &Path) -> String {
    paths
        .iter()
        .map(|p| {
            let entry = concat_entry(p, list_dir);
            format!("file '{}'\n", entry.display().to_string().replace('\'', r"'\''"))
        })
        .collect()
}

async fn write_concat_list(paths: &[PathBuf], list_txt: &Path) -> Result<()> {
    let list_dir = list_txt.parent().unwrap_or(Path::new(""));
    fs::write(list_txt, concat_list_contents(paths, list_dir))
        .await
        .with_context(|| format!("writing concat list {}", list_txt.display()))
}

pub async fn ffmpeg_concat_videos(list_txt: &Path, out_mp4: &Path) -> Result<bool> {
    let mut args = ffmpeg_base();
    args.extend(
        ["-f", "concat", "-safe", "0", "-i"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(list_txt.display().to_string());
    args.extend(h264_output(out_mp4));
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

pub async fn ffmpeg_concat_audio(list_txt: &Path, out_m4a: &Path) -> Result<bool> {
    let mut args = ffmpeg_base();
    args.extend(
        ["-f", "concat", "-safe", "0", "-i"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(list_txt.display().to_string());
    args.extend(["-c:a", "aac", "-b:a", "192k"].iter().map(|s| s.to_string()));
    args.push(out_m4a.display().to_string());
    run_cmd(&args).await?;
    Ok(out_m4a.exists())
}

/// Slow pan/zoom over a still. Alternating `zoom_in` keeps consecutive
/// slides from looking identical.
pub fn ken_burns_filter(width: u32, height: u32, fps: u32, frames: u32, zoom_in: bool) -> String {
    let step = (KEN_BURNS_ZOOM - 1.0) / frames.max(1) as f64;
    let zoom = if zoom_in {
        format!("min(zoom+{:.5},{})", step, KEN_BURNS_ZOOM)
    } else {
        format!("if(eq(on,0),{},max(zoom-{:.5},1.0))", KEN_BURNS_ZOOM, step)
    };
    format!(
        "scale={w2}:{h2}:force_original_aspect_ratio=increase,crop={w2}:{h2},\
         zoompan=z='{zoom}':d={frames}:x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':s={w}x{h}:fps={fps},setsar=1",
        w2 = width * 2,
        h2 = height * 2,
        zoom = zoom,
        frames = frames,
        w = width,
        h = height,
        fps = fps,
    )
}

pub async fn ffmpeg_ken_burns_clip(
    image: &Path,
    seconds: f64,
    render: &RenderConfig,
    zoom_in: bool,
    out_mp4: &Path,
) -> Result<bool> {
    let frames = (seconds * render.fps as f64).round().max(1.0) as u32;
    let mut args = ffmpeg_base();
    args.extend(["-loop", "1", "-i"].iter().map(|s| s.to_string()));
    args.push(image.display().to_string());
    args.push("-vf".to_string());
    args.push(ken_burns_filter(render.width, render.height, render.fps, frames, zoom_in));
    args.push("-t".to_string());
    args.push(format!("{:.3}", seconds));
    args.push("-an".to_string());
    args.extend(h264_output(out_mp4));
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// Escapes a path for use inside a filtergraph `subtitles=` argument.
pub fn escape_filter_path(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "/")
        .replace(':', r"\:")
        .replace('\'', r"\'")
}

const SUBTITLE_STYLE: &str =
    "FontName=Arial,FontSize=16,PrimaryColour=&H00FFFFFF,OutlineColour=&H00000000,BorderStyle=1,Outline=2,Alignment=2,MarginV=60";

/// Filtergraph for the final composition: full-frame primary, or primary on
/// top of the filler when one is present, with optional burned subtitles.
pub fn compose_filter(width: u32, height: u32, fps: u32, has_filler: bool, subtitles: Option<&Path>) -> String {
    let fit = |input: &str, h: u32, label: &str| {
        format!(
            "[{input}:v]scale={width}:{h}:force_original_aspect_ratio=increase,crop={width}:{h},setsar=1,fps={fps}[{label}]"
        )
    };

    let mut graph = if has_filler {
        let half = (height / 2) & !1;
        format!(
            "{};{};[top][bottom]vstack=inputs=2[base]",
            fit("0", half, "top"),
            fit("1", height - half, "bottom")
        )
    } else {
        fit("0", height, "base")
    };

    match subtitles {
        Some(srt) => graph.push_str(&format!(
            ";[base]subtitles='{}':force_style='{}'[v]",
            escape_filter_path(srt),
            SUBTITLE_STYLE
        )),
        None => graph.push_str(";[base]null[v]"),
    }
    graph
}

/// Everything the final render needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub primary: PathBuf,
    pub filler: Option<PathBuf>,
    pub audio: PathBuf,
    pub duration_seconds: f64,
    pub subtitles: Option<PathBuf>,
    pub output: PathBuf,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Joins narration segments in order; returns the joined duration.
    async fn join_audio(&self, segments: &[PathBuf], out: &Path) -> Result<f64>;

    async fn compose(&self, job: &RenderJob) -> Result<PathBuf>;
}

pub struct FfmpegRenderer {
    render: RenderConfig,
}

impl FfmpegRenderer {
    pub fn new(render: RenderConfig) -> Self {
        Self { render }
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn join_audio(&self, segments: &[PathBuf], out: &Path) -> Result<f64> {
        if segments.is_empty() {
            anyhow::bail!("no narration segments to join");
        }
        let list = out.with_extension("txt");
        write_concat_list(segments, &list).await?;
        if !ffmpeg_concat_audio(&list, out).await? {
            anyhow::bail!("audio concat produced no output");
        }
        ffprobe_duration_seconds(out).await
    }

    async fn compose(&self, job: &RenderJob) -> Result<PathBuf> {
        if let Some(parent) = job.output.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut args = ffmpeg_base();
        args.extend(["-stream_loop", "-1", "-i"].iter().map(|s| s.to_string()));
        args.push(job.primary.display().to_string());
        if let Some(filler) = &job.filler {
            args.extend(["-stream_loop", "-1", "-i"].iter().map(|s| s.to_string()));
            args.push(filler.display().to_string());
        }
        args.push("-i".to_string());
        args.push(job.audio.display().to_string());

        let audio_index = if job.filler.is_some() { 2 } else { 1 };
        args.push("-filter_complex".to_string());
        args.push(compose_filter(
            self.render.width,
            self.render.height,
            self.render.fps,
            job.filler.is_some(),
            job.subtitles.as_deref(),
        ));
        args.extend(["-map", "[v]", "-map"].iter().map(|s| s.to_string()));
        args.push(format!("{}:a", audio_index));
        args.push("-t".to_string());
        args.push(format!("{:.3}", job.duration_seconds));
        args.extend(h264_output(&job.output));

        logi(format!(
            "Rendering {:.1}s video (filler: {}, subtitles: {})",
            job.duration_seconds,
            job.filler.is_some(),
            job.subtitles.is_some()
        ));
        run_cmd(&args).await?;
        if !job.output.exists() {
            anyhow::bail!("render produced no output at {}", job.output.display());
        }
        Ok(job.output.clone())
    }
}

/// Builds a tier-3 slideshow from remote stills.
pub struct FfmpegSlideshow {
    client: Client,
    render: RenderConfig,
}

impl FfmpegSlideshow {
    pub fn new(client: Client, render: RenderConfig) -> Self {
        Self { client, render }
    }

    async fn download_image(&self, url: &str, dest: &Path) -> Result<bool> {
        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .with_context(|| format!("image request failed: {}", url))?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let bytes = resp.bytes().await?;
        if (bytes.len() as u64) < MIN_IMAGE_BYTES {
            return Ok(false);
        }
        fs::write(dest, &bytes).await?;
        Ok(true)
    }
}

#[async_trait]
impl SlideshowBuilder for FfmpegSlideshow {
    async fn build(&self, images: &[String], target_secs: f64, dest_dir: &Path) -> Result<Option<PathBuf>> {
        fs::create_dir_all(dest_dir).await?;

        let mut stills = Vec::new();
        for (i, url) in images.iter().enumerate() {
            let path = dest_dir.join(format!("img_{:03}.jpg", i));
            match self.download_image(url, &path).await {
                Ok(true) => stills.push(path),
                Ok(false) => logw(format!("Skipping unusable image {}", url)),
                Err(err) => logw(format!("Image download failed: {:#}", err)),
            }
        }
        if stills.is_empty() {
            return Ok(None);
        }

        let per_slide = self.render.slide_seconds.max(1.0);
        let count = (target_secs / per_slide).ceil().max(1.0) as usize;
        let mut clips = Vec::with_capacity(count);
        for i in 0..count {
            let still = &stills[i % stills.len()];
            let clip = dest_dir.join(format!("slide_{:03}.mp4", i));
            if ffmpeg_ken_burns_clip(still, per_slide, &self.render, i % 2 == 0, &clip).await? {
                clips.push(clip);
            }
        }
        if clips.is_empty() {
            return Ok(None);
        }

        let list = dest_dir.join("slides.txt");
        write_concat_list(&clips, &list).await?;
        let out = dest_dir.join("slideshow.mp4");
        if !ffmpeg_concat_videos(&list, &out).await? {
            return Ok(None);
        }
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_list_quotes_each_path() {
        let list = concat_list_contents(&[PathBuf::from("/tmp/a.mp3"), PathBuf::from("/tmp/it's.mp3")], Path::new("/tmp"));
        assert_eq!(list, "file 'a.mp3'\nfile 'it'\\''s.mp3'\n");
    }

    #[test]
    fn concat_entries_are_relative_to_the_list_directory() {
        let list = concat_list_contents(
            &[PathBuf::from("temp/audio/seg_000.mp3"), PathBuf::from("temp/filler/clip.mp4")],
            Path::new("temp"),
        );
        assert_eq!(list, "file 'audio/seg_000.mp3'\nfile 'filler/clip.mp4'\n");
    }

    #[tokio::test]
    async fn written_list_entries_resolve_from_the_list_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let work = dir.path().join("temp");
        let segments: Vec<PathBuf> = (0..2).map(|i| work.join("audio").join(format!("seg_{:03}.mp3", i))).collect();
        fs::create_dir_all(work.join("audio")).await.unwrap();
        for seg in &segments {
            fs::write(seg, b"mp3").await.unwrap();
        }

        let list = work.join("narration.txt");
        write_concat_list(&segments, &list).await.unwrap();

        let text = fs::read_to_string(&list).await.unwrap();
        let entries: Vec<&str> = text
            .lines()
            .map(|l| l.trim_start_matches("file '").trim_end_matches('\''))
            .collect();
        assert_eq!(entries.len(), 2);
        for entry in entries {
            let resolved = list.parent().unwrap().join(entry);
            assert!(resolved.is_file(), "{} does not exist", resolved.display());
        }
    }

    #[test]
    fn filter_paths_escape_colons_and_quotes() {
        assert_eq!(escape_filter_path(Path::new("C:\\work\\it's.srt")), r"C\:/work/it\'s.srt");
    }

    #[test]
    fn single_source_fills_the_frame() {
        let graph = compose_filter(1080, 1920, 30, false, None);
        assert!(graph.starts_with("[0:v]scale=1080:1920"));
        assert!(!graph.contains("vstack"));
        assert!(graph.ends_with("[base]null[v]"));
    }

    #[test]
    fn filler_is_stacked_under_primary() {
        let graph = compose_filter(1080, 1920, 30, true, Some(Path::new("/w/subs.srt")));
        assert!(graph.contains("[0:v]scale=1080:960"));
        assert!(graph.contains("[1:v]scale=1080:960"));
        assert!(graph.contains("[top][bottom]vstack=inputs=2[base]"));
        assert!(graph.contains("subtitles='/w/subs.srt'"));
    }

    #[test]
    fn ken_burns_directions_differ() {
        let zin = ken_burns_filter(1080, 1920, 30, 120, true);
        let zout = ken_burns_filter(1080, 1920, 30, 120, false);
        assert!(zin.contains("min(zoom+"));
        assert!(zout.contains("max(zoom-"));
        assert!(zin.contains("s=1080x1920:fps=30"));
    }
}
