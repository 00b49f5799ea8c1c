use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Runtime configuration, loaded once from `config.json` and passed down.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub tmdb: TmdbConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,
    #[serde(default)]
    pub stock: StockConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub facebook: FacebookConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_viral_state_file")]
    pub viral_state_file: PathBuf,
    #[serde(default = "default_viral_links_file")]
    pub viral_links_file: PathBuf,
    #[serde(default = "default_catalog_csv")]
    pub catalog_csv: PathBuf,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_cookies_file")]
    pub cookies_file: PathBuf,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("bot_state.json")
}

fn default_viral_state_file() -> PathBuf {
    PathBuf::from("viral_state.json")
}

fn default_viral_links_file() -> PathBuf {
    PathBuf::from("viral_links.txt")
}

fn default_catalog_csv() -> PathBuf {
    PathBuf::from("catalog.csv")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_cookies_file() -> PathBuf {
    PathBuf::from("cookies.txt")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            viral_state_file: default_viral_state_file(),
            viral_links_file: default_viral_links_file(),
            catalog_csv: default_catalog_csv(),
            work_dir: default_work_dir(),
            output_dir: default_output_dir(),
            cookies_file: default_cookies_file(),
        }
    }
}

/// Bounds for the randomized wait between two posts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: i64,
    #[serde(default = "default_max_interval")]
    pub max_interval_secs: i64,
}

fn default_min_interval() -> i64 {
    5 * 3600
}

fn default_max_interval() -> i64 {
    7 * 3600
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval(),
            max_interval_secs: default_max_interval(),
        }
    }
}

/// Movie:Series ratio. The default 3:1 maps counter values 0,1,2 to Movie and 3 to Series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_movies_per_cycle")]
    pub movies_per_cycle: u32,
    #[serde(default = "default_series_per_cycle")]
    pub series_per_cycle: u32,
}

fn default_movies_per_cycle() -> u32 {
    3
}

fn default_series_per_cycle() -> u32 {
    1
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            movies_per_cycle: default_movies_per_cycle(),
            series_per_cycle: default_series_per_cycle(),
        }
    }
}

/// One multiplicative boost applied when any of `genre_ids` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreBoost {
    pub genre_ids: Vec<u32>,
    pub factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_top_pick")]
    pub top_pick: usize,
    #[serde(default = "default_genre_boosts")]
    pub genre_boosts: Vec<GenreBoost>,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_keyword_factor")]
    pub keyword_factor: f64,
    #[serde(default = "default_min_overview_chars")]
    pub min_overview_chars: usize,
}

fn default_candidate_limit() -> usize {
    15
}

fn default_top_pick() -> usize {
    3
}

fn default_genre_boosts() -> Vec<GenreBoost> {
    vec![
        // Sci-Fi
        GenreBoost { genre_ids: vec![878], factor: 2.0 },
        // Comedy
        GenreBoost { genre_ids: vec![35], factor: 1.8 },
        // Mystery / Thriller
        GenreBoost { genre_ids: vec![9648, 53], factor: 1.7 },
        // Drama
        GenreBoost { genre_ids: vec![18], factor: 1.5 },
    ]
}

fn default_keywords() -> Vec<String> {
    [
        "time travel",
        "success",
        "karma",
        "zero to hero",
        "from zero",
        "destiny",
        "revenge",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_keyword_factor() -> f64 {
    1.3
}

fn default_min_overview_chars() -> usize {
    400
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            top_pick: default_top_pick(),
            genre_boosts: default_genre_boosts(),
            keywords: default_keywords(),
            keyword_factor: default_keyword_factor(),
            min_overview_chars: default_min_overview_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub supabase_url: String,
    #[serde(default)]
    pub supabase_key: String,
    #[serde(default = "default_site_base_url")]
    pub site_base_url: String,
    #[serde(default = "default_movie_limit")]
    pub movie_limit: usize,
    #[serde(default = "default_series_limit")]
    pub series_limit: usize,
}

fn default_site_base_url() -> String {
    "https://cinma.online".to_string()
}

fn default_movie_limit() -> usize {
    50
}

fn default_series_limit() -> usize {
    30
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_key: String::new(),
            site_base_url: default_site_base_url(),
            movie_limit: default_movie_limit(),
            series_limit: default_series_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TmdbConfig {
    #[serde(rename = "tmdb_api_key")]
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(rename = "open_api_key")]
    #[serde(default)]
    pub openai_key: String,
    /// Tried in order until one returns a usable script.
    #[serde(default = "default_script_models")]
    pub script_models: Vec<String>,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_script_models() -> Vec<String> {
    vec!["gpt-5.2".to_string(), "gpt-4.1-mini".to_string()]
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_language() -> String {
    "ar".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            openai_key: String::new(),
            script_models: default_script_models(),
            transcription_model: default_transcription_model(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    #[serde(rename = "elevenlabs_api_key")]
    #[serde(default)]
    pub elevenlabs_key: String,
    #[serde(rename = "eleven_voice_id")]
    #[serde(default = "default_voice_id")]
    pub eleven_voice_id: String,
    #[serde(rename = "eleven_model_id")]
    #[serde(default = "default_model_id")]
    pub eleven_model_id: String,
}

fn default_voice_id() -> String {
    "JBFqnCBsd6RMkjVDRZzb".to_string()
}

fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            elevenlabs_key: String::new(),
            eleven_voice_id: default_voice_id(),
            eleven_model_id: default_model_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockConfig {
    #[serde(default)]
    pub pexels_api_key: String,
    /// Tried after the title-based queries.
    #[serde(default = "default_generic_queries")]
    pub generic_queries: Vec<String>,
}

fn default_generic_queries() -> Vec<String> {
    vec![
        "cinematic city night".to_string(),
        "dramatic sky timelapse".to_string(),
        "movie theater".to_string(),
    ]
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            pexels_api_key: String::new(),
            generic_queries: default_generic_queries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_trailer_attempts")]
    pub trailer_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Downloads smaller than this are treated as corrupt.
    #[serde(default = "default_min_file_bytes")]
    pub min_file_bytes: u64,
    #[serde(default = "default_ytdlp_timeout_secs")]
    pub ytdlp_timeout_secs: u64,
    #[serde(default = "default_profile_delay_ms")]
    pub profile_delay_ms: u64,
}

fn default_trailer_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_backoff_max_ms() -> u64 {
    20_000
}

fn default_min_file_bytes() -> u64 {
    1_000
}

fn default_ytdlp_timeout_secs() -> u64 {
    180
}

fn default_profile_delay_ms() -> u64 {
    1_500
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            trailer_attempts: default_trailer_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            min_file_bytes: default_min_file_bytes(),
            ytdlp_timeout_secs: default_ytdlp_timeout_secs(),
            profile_delay_ms: default_profile_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Length of filler footage consumed per reel.
    #[serde(default = "default_filler_seconds")]
    pub filler_seconds: u64,
    /// Minimum time each still stays on screen in a slideshow.
    #[serde(default = "default_slide_seconds")]
    pub slide_seconds: f64,
    #[serde(default = "default_words_per_cue")]
    pub words_per_cue: usize,
}

fn default_width() -> u32 {
    1080
}

fn default_height() -> u32 {
    1920
}

fn default_fps() -> u32 {
    30
}

fn default_filler_seconds() -> u64 {
    20
}

fn default_slide_seconds() -> f64 {
    4.0
}

fn default_words_per_cue() -> usize {
    3
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            filler_seconds: default_filler_seconds(),
            slide_seconds: default_slide_seconds(),
            words_per_cue: default_words_per_cue(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    #[serde(default)]
    pub page_id: String,
    #[serde(default)]
    pub page_token: String,
    #[serde(default = "default_graph_version")]
    pub graph_version: String,
}

fn default_graph_version() -> String {
    "v18.0".to_string()
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            page_id: String::new(),
            page_token: String::new(),
            graph_version: default_graph_version(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub telegram_chat_id: String,
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.openai.openai_key.is_empty() {
            anyhow::bail!("config.json: openai.open_api_key missing");
        }
        if self.openai.script_models.is_empty() {
            anyhow::bail!("config.json: openai.script_models must name at least one model");
        }
        if self.elevenlabs.elevenlabs_key.is_empty() {
            anyhow::bail!("config.json: elevenlabs.elevenlabs_api_key missing");
        }
        if self.schedule.min_interval_secs <= 0
            || self.schedule.min_interval_secs > self.schedule.max_interval_secs
        {
            anyhow::bail!(
                "config.json: schedule interval bounds invalid ({}..={})",
                self.schedule.min_interval_secs,
                self.schedule.max_interval_secs
            );
        }
        if self.rotation.movies_per_cycle + self.rotation.series_per_cycle == 0 {
            anyhow::bail!("config.json: rotation period must be at least 1");
        }
        if self.scoring.top_pick == 0 || self.scoring.candidate_limit == 0 {
            anyhow::bail!("config.json: scoring.top_pick and scoring.candidate_limit must be positive");
        }
        if self.fetch.trailer_attempts == 0 {
            anyhow::bail!("config.json: fetch.trailer_attempts must be positive");
        }
        Ok(())
    }
}
