//! One production cycle, from the schedule gate to the schedule update.
//!
//! Every stage either hands its output to the next one or ends the cycle. A
//! critical failure ends it with exactly one alert and a non-zero exit code;
//! "not due" and "nothing to post" end it quietly with exit code 0.

use crate::alert::{Alerter, failure_message};
use crate::api::elevenlabs::SpeechSynthesizer;
use crate::api::facebook::Publisher;
use crate::api::openai::{Aligner, ScriptGenerator, ScriptRequest};
use crate::catalog::{CatalogSource, gather_candidates};
use crate::config::Config;
use crate::error::{CycleError, Stage};
use crate::ffmpeg::{RenderJob, Renderer};
use crate::filler::{ClipSource, FillerResolver};
use crate::metadata::MetadataService;
use crate::models::{ContentItem, ContentKind, Narration, Script};
use crate::page::WatchPage;
use crate::resolver::{AssetResolver, SlideshowBuilder, StockFootage, VideoFetcher};
use crate::retry::RetryPolicy;
use crate::schedule::{record_publish_attempt, should_proceed};
use crate::selector::{RotationPolicy, Selection, Selector};
use crate::srt::write_srt;
use crate::state::{JsonStore, SchedulerState};
use crate::{loge, logi, logok, logw};
use anyhow::{Context, anyhow};
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// Every external dependency of a cycle.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub catalog: &'a dyn CatalogSource,
    pub fallback_catalog: Option<&'a dyn CatalogSource>,
    pub metadata: &'a dyn MetadataService,
    pub pages: &'a dyn WatchPage,
    pub scripts: &'a dyn ScriptGenerator,
    pub voice: &'a dyn SpeechSynthesizer,
    pub aligner: &'a dyn Aligner,
    pub fetcher: &'a dyn VideoFetcher,
    pub stock: &'a dyn StockFootage,
    pub slideshow: &'a dyn SlideshowBuilder,
    pub clips: &'a dyn ClipSource,
    pub renderer: &'a dyn Renderer,
    pub publisher: &'a dyn Publisher,
    pub alerter: &'a dyn Alerter,
}

/// Operator-chosen title that bypasses selection and the schedule gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualPick {
    pub title: String,
    pub kind: ContentKind,
    pub trailer_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOptions {
    pub force: bool,
    /// Render but neither publish nor touch the scheduler record.
    pub simulate: bool,
    pub manual: Option<ManualPick>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    NotDue,
    NoContent,
    Published { id: String, title: String, video: PathBuf },
    PublishFailed { id: String, title: String, video: PathBuf },
    Simulated { title: String, video: PathBuf },
    Aborted { stage: Stage, title: Option<String>, reason: String, critical: bool },
}

impl CycleOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Aborted { critical: true, .. } => 1,
            _ => 0,
        }
    }
}

/// Lowercase slug used for manual ids and output file names.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() { "untitled".to_string() } else { slug }
}

/// Sentence-sized pieces for segment-by-segment synthesis.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch == '\n' {
            push_sentence(&mut out, &mut current);
            continue;
        }
        current.push(ch);
        if matches!(ch, '.' | '!' | '?' | '؟' | '…') {
            push_sentence(&mut out, &mut current);
        }
    }
    push_sentence(&mut out, &mut current);
    out
}

fn push_sentence(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if trimmed.chars().any(|c| c.is_alphanumeric()) {
        out.push(trimmed.to_string());
    }
    current.clear();
}

/// Empties `dir` without removing it.
pub async fn clear_work_dir(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).await?;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir_all(path).await?;
        } else {
            fs::remove_file(path).await?;
        }
    }
    Ok(())
}

fn first_comment(item: &ContentItem) -> Option<String> {
    if item.watch_url.trim().is_empty() {
        return None;
    }
    Some(format!("🎬 شاهد {} كاملاً هنا: {}", item.title, item.watch_url))
}

pub struct Orchestrator<'a> {
    cfg: &'a Config,
    deps: Collaborators<'a>,
    store: JsonStore<SchedulerState>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(cfg: &'a Config, deps: Collaborators<'a>) -> Self {
        Self {
            cfg,
            deps,
            store: JsonStore::new(cfg.paths.state_file.clone()),
        }
    }

    /// Runs one cycle. Never returns an error: failures become
    /// [`CycleOutcome::Aborted`] after the alert has been dispatched.
    pub async fn run_cycle<R: Rng>(&self, opts: &CycleOptions, now: i64, rng: &mut R) -> CycleOutcome {
        let mut title = None;
        match self.produce(opts, now, rng, &mut title).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = format!("{:#}", err.source);
                loge(format!("Cycle aborted during {}: {}", err.stage, reason));
                self.deps
                    .alerter
                    .notify(&failure_message(title.as_deref(), err.stage, &reason))
                    .await;
                CycleOutcome::Aborted {
                    stage: err.stage,
                    critical: err.is_critical(),
                    title,
                    reason,
                }
            }
        }
    }

    async fn produce<R: Rng>(
        &self,
        opts: &CycleOptions,
        now: i64,
        rng: &mut R,
        title: &mut Option<String>,
    ) -> Result<CycleOutcome, CycleError> {
        logi(format!("Stage: {}", Stage::Gated));
        let bypass = opts.force || opts.manual.is_some();
        if !should_proceed(&self.store, bypass, now)
            .await
            .map_err(|e| CycleError::new(Stage::Gated, e))?
        {
            return Ok(CycleOutcome::NotDue);
        }

        clear_work_dir(&self.cfg.paths.work_dir)
            .await
            .map_err(|e| CycleError::new(Stage::Gated, e.context("clearing work dir")))?;

        logi(format!("Stage: {}", Stage::Selecting));
        let mut state = self
            .store
            .load_or_default()
            .await
            .map_err(|e| CycleError::new(Stage::Selecting, e))?;
        let Some(item) = self.select(opts, &mut state, rng).await? else {
            return Ok(CycleOutcome::NoContent);
        };
        *title = Some(item.title.clone());
        if !opts.simulate && opts.manual.is_none() {
            self.store
                .save(&state)
                .await
                .map_err(|e| CycleError::new(Stage::Selecting, e))?;
        }

        logi(format!("Stage: {}", Stage::ScriptGen));
        let script = self.write_script(&item).await?;

        logi(format!("Stage: {}", Stage::AudioGen));
        let narration = self.narrate(&script).await?;
        let subtitles = self.subtitles(&narration.audio).await;

        logi(format!("Stage: {}", Stage::AssetResolving));
        let (primary, filler) = self.gather_visuals(&item, narration.duration_seconds).await?;

        logi(format!("Stage: {}", Stage::Rendering));
        let output = self.cfg.paths.output_dir.join(format!("reel_{}_{}.mp4", slugify(&item.title), now));
        let video = self
            .deps
            .renderer
            .compose(&RenderJob {
                primary,
                filler,
                audio: narration.audio.clone(),
                duration_seconds: narration.duration_seconds,
                subtitles,
                output,
            })
            .await
            .map_err(|e| CycleError::new(Stage::Rendering, e))?;
        logok(format!("Rendered {}", video.display()));

        if opts.simulate {
            logi("Simulation mode: skipping publish and schedule update.");
            return Ok(CycleOutcome::Simulated {
                title: item.title,
                video,
            });
        }

        logi(format!("Stage: {}", Stage::Publishing));
        let comment = first_comment(&item);
        let published = match self
            .deps
            .publisher
            .upload(&video, &script.caption, comment.as_deref())
            .await
        {
            Ok(published) => published,
            Err(err) => {
                logw(format!("Publish failed: {:#}", err));
                false
            }
        };

        logi(format!("Stage: {}", Stage::ScheduleUpdate));
        record_publish_attempt(&mut state, &item.id, published, &self.cfg.schedule, now, rng);
        self.store
            .save(&state)
            .await
            .map_err(|e| CycleError::new(Stage::ScheduleUpdate, e))?;
        logi(format!(
            "Next post in {}s ({} titles posted so far).",
            state.next_interval_seconds,
            state.posted_ids.len()
        ));

        if published {
            logok(format!("Published {} ({})", item.title, item.id));
            Ok(CycleOutcome::Published {
                id: item.id,
                title: item.title,
                video,
            })
        } else {
            self.deps
                .alerter
                .notify(&failure_message(
                    Some(&item.title),
                    Stage::Publishing,
                    "upload was not confirmed; the title stays eligible for a later cycle",
                ))
                .await;
            Ok(CycleOutcome::PublishFailed {
                id: item.id,
                title: item.title,
                video,
            })
        }
    }

    async fn select<R: Rng>(
        &self,
        opts: &CycleOptions,
        state: &mut SchedulerState,
        rng: &mut R,
    ) -> Result<Option<ContentItem>, CycleError> {
        let selector = Selector::new(
            self.deps.metadata,
            self.deps.pages,
            &self.cfg.scoring,
            RotationPolicy::from_config(&self.cfg.rotation),
        );

        if let Some(pick) = &opts.manual {
            logi(format!("Manual mode: {}", pick.title));
            let mut item = ContentItem::new(format!("manual:{}", slugify(&pick.title)), pick.title.clone(), pick.kind);
            item.trailer_url = pick.trailer_url.clone().filter(|u| !u.trim().is_empty());
            let item = selector.enrich(item).await;
            return Ok(Some(selector.resolve_assets(item).await));
        }

        let candidates = gather_candidates(self.deps.catalog, self.deps.fallback_catalog, &state.posted_ids).await;
        match selector
            .select_next(candidates, state, rng)
            .await
            .map_err(|e| CycleError::new(Stage::Selecting, e))?
        {
            Selection::Found(item) => Ok(Some(item)),
            Selection::Empty => {
                logw("Nothing new to post this cycle.");
                Ok(None)
            }
        }
    }

    async fn write_script(&self, item: &ContentItem) -> Result<Script, CycleError> {
        let request = ScriptRequest {
            title: item.title.clone(),
            kind: item.kind,
            overview: item.overview_text().to_string(),
            site_url: self.cfg.catalog.site_base_url.clone(),
        };
        self.deps
            .scripts
            .generate(&request)
            .await
            .map_err(|e| CycleError::new(Stage::ScriptGen, e))
    }

    async fn narrate(&self, script: &Script) -> Result<Narration, CycleError> {
        let audio_dir = self.cfg.paths.work_dir.join("audio");
        fs::create_dir_all(&audio_dir)
            .await
            .map_err(|e| CycleError::new(Stage::AudioGen, e))?;

        let sentences = split_sentences(&script.body);
        let mut segments = Vec::new();
        for (i, sentence) in sentences.iter().enumerate() {
            let out = audio_dir.join(format!("seg_{:03}.mp3", i));
            match self.deps.voice.synthesize(sentence, &out).await {
                Ok(true) => segments.push(out),
                Ok(false) => logw(format!("Audio segment {} skipped.", i + 1)),
                Err(err) => logw(format!("Audio segment {} failed: {:#}", i + 1, err)),
            }
        }
        if segments.is_empty() {
            return Err(CycleError::new(
                Stage::AudioGen,
                anyhow!("zero usable audio segments out of {}", sentences.len()),
            ));
        }
        logi(format!("Synthesised {}/{} segments.", segments.len(), sentences.len()));

        let audio = self.cfg.paths.work_dir.join("narration.m4a");
        let duration_seconds = self
            .deps
            .renderer
            .join_audio(&segments, &audio)
            .await
            .context("joining narration")
            .map_err(|e| CycleError::new(Stage::AudioGen, e))?;
        Ok(Narration {
            audio,
            duration_seconds,
            segments: segments.len(),
        })
    }

    /// Subtitle file for the narration. Alignment problems only cost the
    /// subtitles, never the reel.
    async fn subtitles(&self, audio: &Path) -> Option<PathBuf> {
        let words = match self.deps.aligner.align(audio).await {
            Ok(words) => words,
            Err(err) => {
                logw(format!("Word alignment failed; rendering without subtitles: {:#}", err));
                return None;
            }
        };
        let path = self.cfg.paths.work_dir.join("subtitles.srt");
        match write_srt(&words, self.cfg.render.words_per_cue, &path).await {
            Ok(true) => Some(path),
            Ok(false) => {
                logw("Alignment returned no words; rendering without subtitles.");
                None
            }
            Err(err) => {
                logw(format!("Subtitle write failed: {:#}", err));
                None
            }
        }
    }

    async fn gather_visuals(
        &self,
        item: &ContentItem,
        target_secs: f64,
    ) -> Result<(PathBuf, Option<PathBuf>), CycleError> {
        let fetch = &self.cfg.fetch;
        let resolver = AssetResolver::new(
            self.deps.fetcher,
            self.deps.stock,
            self.deps.metadata,
            self.deps.slideshow,
            RetryPolicy::exponential(fetch.trailer_attempts, fetch.backoff_base_ms, fetch.backoff_max_ms),
            fetch.min_file_bytes,
            self.cfg.stock.generic_queries.clone(),
            self.cfg.paths.work_dir.clone(),
        );
        let primary = resolver
            .resolve_primary_video(item, target_secs)
            .await
            .map_err(|e| CycleError::new(Stage::AssetResolving, e))?;

        let filler = FillerResolver::new(
            self.deps.clips,
            JsonStore::new(self.cfg.paths.viral_state_file.clone()),
            self.cfg.paths.viral_links_file.clone(),
            self.cfg.paths.work_dir.join("filler"),
        );
        let filler = match filler.resolve_filler_clip(self.cfg.render.filler_seconds).await {
            Ok(clip) => clip,
            Err(err) => {
                logw(format!("Filler lookup failed; rendering without filler: {:#}", err));
                None
            }
        };
        Ok((primary.path, filler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WordTiming;
    use crate::page::PageAssets;
    use crate::resolver::tests::{ImageMeta, Journal, ScriptedFetcher, ScriptedSlides, ScriptedStock};
    use anyhow::Result;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FixedCatalog(Vec<ContentItem>);

    #[async_trait]
    impl CatalogSource for FixedCatalog {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn list_recent(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
            Ok(self.0.iter().filter(|i| i.kind == kind).cloned().collect())
        }
    }

    struct BlankPage;

    #[async_trait]
    impl WatchPage for BlankPage {
        async fn inspect(&self, _url: &str) -> Result<PageAssets> {
            Ok(PageAssets::default())
        }
    }

    struct FakeScripts {
        fail: bool,
        body: &'static str,
    }

    #[async_trait]
    impl ScriptGenerator for FakeScripts {
        async fn generate(&self, request: &ScriptRequest) -> Result<Script> {
            if self.fail {
                anyhow::bail!("all script models failed (m1, m2)");
            }
            Ok(Script {
                body: self.body.to_string(),
                caption: format!("{} #reels", request.title),
            })
        }
    }

    struct FakeVoice {
        works: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeVoice {
        async fn synthesize(&self, _text: &str, out: &Path) -> Result<bool> {
            if !self.works {
                return Ok(false);
            }
            fs::write(out, b"mp3").await?;
            Ok(true)
        }
    }

    struct FakeAligner {
        fail: bool,
    }

    #[async_trait]
    impl Aligner for FakeAligner {
        async fn align(&self, _audio: &Path) -> Result<Vec<WordTiming>> {
            if self.fail {
                anyhow::bail!("transcription HTTP 500");
            }
            Ok(vec![WordTiming {
                word: "hello".into(),
                start: 0.0,
                end: 0.5,
            }])
        }
    }

    struct NoClips;

    #[async_trait]
    impl ClipSource for NoClips {
        async fn duration(&self, _url: &str) -> Result<f64> {
            anyhow::bail!("offline")
        }

        async fn extract(&self, _url: &str, _s: u64, _n: u64, _d: &Path) -> Result<PathBuf> {
            anyhow::bail!("offline")
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        jobs: Mutex<Vec<RenderJob>>,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn join_audio(&self, segments: &[PathBuf], out: &Path) -> Result<f64> {
            fs::write(out, b"m4a").await?;
            Ok(segments.len() as f64 * 5.0)
        }

        async fn compose(&self, job: &RenderJob) -> Result<PathBuf> {
            if let Some(parent) = job.output.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&job.output, b"mp4").await?;
            self.jobs.lock().unwrap().push(job.clone());
            Ok(job.output.clone())
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        reject: bool,
        uploads: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn upload(&self, _video: &Path, caption: &str, comment: Option<&str>) -> Result<bool> {
            self.uploads
                .lock()
                .unwrap()
                .push((caption.to_string(), comment.map(str::to_string)));
            Ok(!self.reject)
        }
    }

    #[derive(Default)]
    struct RecordingAlerter(Mutex<Vec<String>>);

    #[async_trait]
    impl Alerter for RecordingAlerter {
        async fn notify(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn item(id: &str, title: &str, kind: ContentKind) -> ContentItem {
        let mut item = ContentItem::new(id, title, kind);
        item.watch_url = format!("https://cinma.online/{}/{}", kind.path_segment(), id);
        item
    }

    struct Harness {
        _dir: TempDir,
        cfg: Config,
        journal: Journal,
        catalog: FixedCatalog,
        meta: ImageMeta,
        scripts: FakeScripts,
        voice: FakeVoice,
        aligner: FakeAligner,
        trailer_ok: bool,
        renderer: FakeRenderer,
        publisher: FakePublisher,
        alerts: RecordingAlerter,
    }

    impl Harness {
        fn new(catalog: Vec<ContentItem>) -> Self {
            let dir = TempDir::new().unwrap();
            let mut cfg = Config::default();
            cfg.paths.state_file = dir.path().join("bot_state.json");
            cfg.paths.viral_state_file = dir.path().join("viral_state.json");
            cfg.paths.viral_links_file = dir.path().join("viral_links.txt");
            cfg.paths.work_dir = dir.path().join("temp");
            cfg.paths.output_dir = dir.path().join("output");
            cfg.fetch.backoff_base_ms = 0;
            cfg.fetch.backoff_max_ms = 0;
            Self {
                _dir: dir,
                cfg,
                journal: Journal::default(),
                catalog: FixedCatalog(catalog),
                meta: ImageMeta { images: vec![] },
                scripts: FakeScripts {
                    fail: false,
                    body: "First line. Second line!",
                },
                voice: FakeVoice { works: true },
                aligner: FakeAligner { fail: false },
                trailer_ok: true,
                renderer: FakeRenderer::default(),
                publisher: FakePublisher::default(),
                alerts: RecordingAlerter::default(),
            }
        }

        fn store(&self) -> JsonStore<SchedulerState> {
            JsonStore::new(self.cfg.paths.state_file.clone())
        }

        async fn run(&self, opts: CycleOptions, now: i64) -> CycleOutcome {
            let fetcher = ScriptedFetcher {
                journal: &self.journal,
                succeed_on: if self.trailer_ok { Some(1) } else { None },
                bytes: 4_096,
            };
            let stock = ScriptedStock {
                journal: &self.journal,
                hit: None,
            };
            let slides = ScriptedSlides {
                journal: &self.journal,
                usable: true,
            };
            let deps = Collaborators {
                catalog: &self.catalog,
                fallback_catalog: None,
                metadata: &self.meta,
                pages: &BlankPage,
                scripts: &self.scripts,
                voice: &self.voice,
                aligner: &self.aligner,
                fetcher: &fetcher,
                stock: &stock,
                slideshow: &slides,
                clips: &NoClips,
                renderer: &self.renderer,
                publisher: &self.publisher,
                alerter: &self.alerts,
            };
            let mut rng = StdRng::seed_from_u64(now as u64);
            Orchestrator::new(&self.cfg, deps).run_cycle(&opts, now, &mut rng).await
        }

        fn alerts(&self) -> Vec<String> {
            self.alerts.0.lock().unwrap().clone()
        }

        async fn save_due_state(&self) -> String {
            self.store()
                .save(&SchedulerState {
                    last_post_timestamp: 1_000,
                    next_interval_seconds: 100,
                    ..Default::default()
                })
                .await
                .unwrap();
            fs::read_to_string(&self.cfg.paths.state_file).await.unwrap()
        }
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        assert_eq!(
            split_sentences("Wow! Is it real? Yes.\nEnd…  ."),
            vec!["Wow!", "Is it real?", "Yes.", "End…"]
        );
        assert_eq!(split_sentences("هل تصدق؟ لا"), vec!["هل تصدق؟", "لا"]);
        assert!(split_sentences(" ... ").is_empty());
    }

    #[test]
    fn slugs_are_lowercase_and_dashed() {
        assert_eq!(slugify("The Dark Knight: Rises!"), "the-dark-knight-rises");
        assert_eq!(slugify("???"), "untitled");
    }

    #[tokio::test]
    async fn work_dir_is_emptied_but_kept() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("temp");
        fs::create_dir_all(work.join("nested")).await.unwrap();
        fs::write(work.join("nested/a.mp4"), b"x").await.unwrap();
        fs::write(work.join("b.mp3"), b"y").await.unwrap();

        clear_work_dir(&work).await.unwrap();
        assert!(work.is_dir());
        assert!(std::fs::read_dir(&work).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn empty_catalog_is_a_quiet_no_op() {
        let h = Harness::new(vec![]);
        let before = h.save_due_state().await;

        let outcome = h.run(CycleOptions::default(), 5_000).await;
        assert_eq!(outcome, CycleOutcome::NoContent);
        assert_eq!(outcome.exit_code(), 0);
        assert!(h.alerts().is_empty());
        assert_eq!(fs::read_to_string(&h.cfg.paths.state_file).await.unwrap(), before);
    }

    #[tokio::test]
    async fn not_due_stops_at_the_gate() {
        let h = Harness::new(vec![item("1", "Heat", ContentKind::Movie)]);
        h.save_due_state().await;

        let outcome = h.run(CycleOptions::default(), 1_050).await;
        assert_eq!(outcome, CycleOutcome::NotDue);
        assert!(h.publisher.uploads.lock().unwrap().is_empty());
        assert!(h.alerts().is_empty());
    }

    #[tokio::test]
    async fn successful_publish_updates_the_schedule() {
        let h = Harness::new(vec![item("42", "Heat", ContentKind::Movie)]);
        h.save_due_state().await;
        fs::create_dir_all(&h.cfg.paths.work_dir).await.unwrap();
        fs::write(h.cfg.paths.work_dir.join("stale.mp4"), b"old").await.unwrap();

        let outcome = h.run(CycleOptions::default(), 9_000).await;
        let CycleOutcome::Published { id, video, .. } = &outcome else {
            panic!("unexpected outcome {:?}", outcome);
        };
        assert_eq!(id, "42");
        assert!(video.exists());
        assert_eq!(outcome.exit_code(), 0);
        assert!(!h.cfg.paths.work_dir.join("stale.mp4").exists());

        let state = h.store().load().await.unwrap().unwrap();
        assert!(state.is_posted("42"));
        assert_eq!(state.last_post_timestamp, 9_000);
        assert!((18_000..=25_200).contains(&state.next_interval_seconds));
        assert_eq!(state.rotation_counter, 1);

        let uploads = h.publisher.uploads.lock().unwrap().clone();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "Heat #reels");
        assert!(uploads[0].1.as_deref().unwrap().contains("https://cinma.online/movie/42"));

        let jobs = h.renderer.jobs.lock().unwrap().clone();
        assert_eq!(jobs[0].duration_seconds, 10.0);
        assert!(jobs[0].subtitles.is_some());
        assert!(jobs[0].filler.is_none());
        assert!(h.alerts().is_empty());
    }

    #[tokio::test]
    async fn exhausted_assets_abort_with_one_alert() {
        let mut h = Harness::new(vec![item("7", "Heat", ContentKind::Movie)]);
        h.trailer_ok = false;
        let before = h.save_due_state().await;

        let outcome = h.run(CycleOptions::default(), 9_000).await;
        assert!(matches!(
            outcome,
            CycleOutcome::Aborted { stage: Stage::AssetResolving, critical: true, .. }
        ));
        assert_eq!(outcome.exit_code(), 1);

        let alerts = h.alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("Heat"));
        assert!(alerts[0].contains("asset resolution"));

        let calls = h.journal.entries();
        let trailers = calls.iter().filter(|c| c.starts_with("trailer")).count();
        let first_stock = calls.iter().position(|c| c.starts_with("stock")).unwrap();
        assert_eq!(trailers, 3);
        assert!(calls[..first_stock].iter().all(|c| c.starts_with("trailer")));
        assert!(!calls.iter().any(|c| c.starts_with("slideshow")));
        assert!(h.publisher.uploads.lock().unwrap().is_empty());

        let state = h.store().load().await.unwrap().unwrap();
        assert!(state.posted_ids.is_empty());
        assert_eq!(state.last_post_timestamp, 1_000);
        assert_ne!(fs::read_to_string(&h.cfg.paths.state_file).await.unwrap(), before);
    }

    #[tokio::test]
    async fn rejected_upload_advances_slot_without_recording_id() {
        let mut h = Harness::new(vec![item("9", "Up", ContentKind::Movie)]);
        h.publisher.reject = true;
        h.save_due_state().await;

        let outcome = h.run(CycleOptions::default(), 9_000).await;
        assert!(matches!(outcome, CycleOutcome::PublishFailed { .. }));
        assert_eq!(outcome.exit_code(), 0);

        let state = h.store().load().await.unwrap().unwrap();
        assert!(!state.is_posted("9"));
        assert_eq!(state.last_post_timestamp, 9_000);
        assert_eq!(h.alerts().len(), 1);
        assert!(h.alerts()[0].contains("publishing"));
    }

    #[tokio::test]
    async fn script_failure_is_critical() {
        let mut h = Harness::new(vec![item("1", "Heat", ContentKind::Movie)]);
        h.scripts.fail = true;
        h.save_due_state().await;

        let outcome = h.run(CycleOptions::default(), 9_000).await;
        assert!(matches!(outcome, CycleOutcome::Aborted { stage: Stage::ScriptGen, .. }));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(h.alerts().len(), 1);
    }

    #[tokio::test]
    async fn zero_audio_segments_is_critical() {
        let mut h = Harness::new(vec![item("1", "Heat", ContentKind::Movie)]);
        h.voice.works = false;
        h.save_due_state().await;

        let outcome = h.run(CycleOptions::default(), 9_000).await;
        assert!(matches!(outcome, CycleOutcome::Aborted { stage: Stage::AudioGen, .. }));
        assert!(h.renderer.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn alignment_failure_only_drops_subtitles() {
        let mut h = Harness::new(vec![item("1", "Heat", ContentKind::Movie)]);
        h.aligner.fail = true;
        h.save_due_state().await;

        let outcome = h.run(CycleOptions::default(), 9_000).await;
        assert!(matches!(outcome, CycleOutcome::Published { .. }));
        assert!(h.renderer.jobs.lock().unwrap()[0].subtitles.is_none());
    }

    #[tokio::test]
    async fn simulation_renders_without_publishing_or_scheduling() {
        let h = Harness::new(vec![item("1", "Heat", ContentKind::Movie)]);
        let before = h.save_due_state().await;

        let outcome = h.run(CycleOptions { simulate: true, ..Default::default() }, 9_000).await;
        assert!(matches!(outcome, CycleOutcome::Simulated { .. }));
        assert!(h.publisher.uploads.lock().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&h.cfg.paths.state_file).await.unwrap(), before);
    }

    #[tokio::test]
    async fn manual_pick_bypasses_gate_and_catalog() {
        let h = Harness::new(vec![]);
        h.store()
            .save(&SchedulerState {
                last_post_timestamp: 9_000,
                next_interval_seconds: 20_000,
                rotation_counter: 2,
                ..Default::default()
            })
            .await
            .unwrap();

        let opts = CycleOptions {
            manual: Some(ManualPick {
                title: "Back to the Future".into(),
                kind: ContentKind::Movie,
                trailer_url: Some("https://youtu.be/qvsgGtivCgs".into()),
            }),
            ..Default::default()
        };
        let outcome = h.run(opts, 9_100).await;
        let CycleOutcome::Published { id, .. } = outcome else {
            panic!("manual cycle did not publish");
        };
        assert_eq!(id, "manual:back-to-the-future");
        assert_eq!(h.journal.entries()[0], "trailer:https://youtu.be/qvsgGtivCgs");

        let state = h.store().load().await.unwrap().unwrap();
        assert_eq!(state.rotation_counter, 2);
        assert!(state.is_posted("manual:back-to-the-future"));
    }

    #[tokio::test]
    async fn forced_cycles_never_repeat_a_title() {
        let h = Harness::new(vec![
            item("1", "Alien", ContentKind::Movie),
            item("2", "Heat", ContentKind::Movie),
            item("3", "Dark", ContentKind::Series),
        ]);
        let forced = CycleOptions { force: true, ..Default::default() };

        let mut seen = Vec::new();
        for cycle in 0..3 {
            match h.run(forced.clone(), 10_000 + cycle).await {
                CycleOutcome::Published { id, .. } => {
                    assert!(!seen.contains(&id), "{} posted twice", id);
                    seen.push(id);
                }
                other => panic!("cycle {} ended with {:?}", cycle, other),
            }
        }
        assert_eq!(h.run(forced, 10_010).await, CycleOutcome::NoContent);

        let state = h.store().load().await.unwrap().unwrap();
        assert_eq!(state.posted_ids.len(), 3);
    }
}
