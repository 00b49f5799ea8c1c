use anyhow::{Context, Result};
use cinema_reels::alert::AlertDispatcher;
use cinema_reels::api::elevenlabs::ElevenLabsVoice;
use cinema_reels::api::facebook::FacebookPage;
use cinema_reels::api::openai::{OpenAiAligner, OpenAiScriptWriter};
use cinema_reels::catalog::{CsvCatalog, SupabaseCatalog};
use cinema_reels::config::Config;
use cinema_reels::ffmpeg::{FfmpegRenderer, FfmpegSlideshow};
use cinema_reels::init;
use cinema_reels::metadata::TmdbClient;
use cinema_reels::models::ContentKind;
use cinema_reels::orchestrator::{Collaborators, CycleOptions, CycleOutcome, ManualPick, Orchestrator};
use cinema_reels::page::WatchPageScraper;
use cinema_reels::schedule::now_epoch;
use cinema_reels::stock::PexelsStock;
use cinema_reels::ytdlp::YtDlpFetcher;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cinema-reels-cli", about = "Run one reel production cycle")]
struct Cli {
    /// Path to configuration file
    #[arg(long, short, default_value = "config.json")]
    config: PathBuf,

    /// Ignore the posting schedule
    #[arg(long)]
    force: bool,

    /// Render the reel but do not publish or update the schedule
    #[arg(long)]
    simulate: bool,

    /// Produce this title instead of picking one from the catalog
    #[arg(long)]
    title: Option<String>,

    /// Trailer URL for --title
    #[arg(long, requires = "title")]
    trailer: Option<String>,

    /// Content type for --title (movie or series)
    #[arg(long, default_value = "movie", value_parser = parse_kind)]
    kind: ContentKind,
}

fn parse_kind(value: &str) -> Result<ContentKind, String> {
    ContentKind::parse(value).ok_or_else(|| format!("unknown content type '{}'", value))
}

fn describe(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::NotDue => info!("Not due yet; nothing to do."),
        CycleOutcome::NoContent => warn!("No new content to post."),
        CycleOutcome::Published { id, title, video } => {
            info!(%id, video = %video.display(), "published {}", title)
        }
        CycleOutcome::PublishFailed { id, title, .. } => {
            warn!(%id, "upload of {} failed; it stays eligible", title)
        }
        CycleOutcome::Simulated { title, video } => {
            info!(video = %video.display(), "simulation finished for {}", title)
        }
        CycleOutcome::Aborted { stage, title, reason, .. } => error!(
            %stage,
            title = title.as_deref().unwrap_or("-"),
            "cycle aborted: {}",
            reason
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = Config::load(&cli.config)
        .await
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    info!(config_path = %cli.config.display(), "config loaded");

    init::ensure_directories(&cfg.paths).await?;
    let missing = init::check_tools().await;
    if !missing.is_empty() {
        warn!("missing tools: {}", missing.join(", "));
    }

    let client = reqwest::Client::builder()
        .gzip(true)
        .cookie_store(true)
        .connect_timeout(Duration::from_secs(15))
        .build()
        .context("building HTTP client")?;

    let catalog = SupabaseCatalog::new(client.clone(), cfg.catalog.clone());
    let local_catalog = CsvCatalog::new(cfg.paths.catalog_csv.clone());
    let metadata = TmdbClient::new(client.clone(), cfg.tmdb.api_key.clone());
    let pages = WatchPageScraper::new(client.clone());
    let scripts = OpenAiScriptWriter::new(client.clone(), cfg.openai.clone());
    let aligner = OpenAiAligner::new(client.clone(), cfg.openai.clone());
    let voice = ElevenLabsVoice::new(client.clone(), cfg.elevenlabs.clone());
    let fetcher = YtDlpFetcher::new(
        cfg.paths.cookies_file.clone(),
        Duration::from_secs(cfg.fetch.ytdlp_timeout_secs),
        cfg.fetch.min_file_bytes,
        Duration::from_millis(cfg.fetch.profile_delay_ms),
    );
    let stock = PexelsStock::new(client.clone(), cfg.stock.pexels_api_key.clone());
    let slideshow = FfmpegSlideshow::new(client.clone(), cfg.render.clone());
    let renderer = FfmpegRenderer::new(cfg.render.clone());
    let publisher = FacebookPage::new(client.clone(), cfg.facebook.clone());
    let alerter = AlertDispatcher::from_config(client, &cfg.alerts);

    let deps = Collaborators {
        catalog: &catalog,
        fallback_catalog: Some(&local_catalog),
        metadata: &metadata,
        pages: &pages,
        scripts: &scripts,
        voice: &voice,
        aligner: &aligner,
        fetcher: &fetcher,
        stock: &stock,
        slideshow: &slideshow,
        clips: &fetcher,
        renderer: &renderer,
        publisher: &publisher,
        alerter: &alerter,
    };

    let opts = CycleOptions {
        force: cli.force,
        simulate: cli.simulate,
        manual: cli.title.map(|title| ManualPick {
            title,
            kind: cli.kind,
            trailer_url: cli.trailer,
        }),
    };

    let mut rng = StdRng::from_entropy();
    let outcome = Orchestrator::new(&cfg, deps)
        .run_cycle(&opts, now_epoch(), &mut rng)
        .await;
    describe(&outcome);
    std::process::exit(outcome.exit_code());
}
