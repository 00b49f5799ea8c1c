use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    Movie,
    Series,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "Movie",
            Self::Series => "Series",
        }
    }

    /// Path segment used by the metadata service and the watch site.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "tv",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "movie" | "film" => Some(Self::Movie),
            "series" | "tv" | "show" => Some(Self::Series),
            _ => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate built fresh each cycle. Only `id` is ever persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub kind: ContentKind,
    pub watch_url: String,
    pub trailer_url: Option<String>,
    pub poster_url: Option<String>,
    pub overview: Option<String>,
    pub popularity_score: f64,
    pub genre_ids: Vec<u32>,
    pub external_id: Option<u64>,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            watch_url: String::new(),
            trailer_url: None,
            poster_url: None,
            overview: None,
            popularity_score: 0.0,
            genre_ids: Vec::new(),
            external_id: None,
        }
    }

    pub fn overview_text(&self) -> &str {
        self.overview.as_deref().unwrap_or("")
    }
}

/// Narration text plus the post caption, as returned by the script generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub body: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Joined voice-over for one reel.
#[derive(Debug, Clone)]
pub struct Narration {
    pub audio: PathBuf,
    pub duration_seconds: f64,
    pub segments: usize,
}
