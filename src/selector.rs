use crate::config::{RotationConfig, ScoringConfig};
use crate::metadata::MetadataService;
use crate::models::{ContentItem, ContentKind};
use crate::page::WatchPage;
use crate::state::SchedulerState;
use crate::{logi, logok, logw};
use anyhow::Result;
use rand::Rng;

/// Appended to thin overviews so the script writer fills in the story itself.
pub const EXPAND_DIRECTIVE: &str =
    "If the overview is short, use your internal knowledge to expand the story to about 150 words.";

/// Outcome of a selection pass. An empty queue is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Found(ContentItem),
    Empty,
}

/// Fixed N:1 type rotation. Counter values `0..movies` pick Movie, the
/// remaining `series` values pick Series, then the counter wraps to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    movies: u32,
    series: u32,
}

impl RotationPolicy {
    pub fn new(movies: u32, series: u32) -> Self {
        Self { movies, series }
    }

    pub fn from_config(cfg: &RotationConfig) -> Self {
        Self::new(cfg.movies_per_cycle, cfg.series_per_cycle)
    }

    pub fn period(&self) -> u32 {
        (self.movies + self.series).max(1)
    }

    pub fn target(&self, counter: u32) -> ContentKind {
        if counter % self.period() < self.movies {
            ContentKind::Movie
        } else {
            ContentKind::Series
        }
    }

    pub fn advance(&self, counter: u32) -> u32 {
        (counter % self.period() + 1) % self.period()
    }
}

/// `popularity` compounded by every matching genre boost and, at most once,
/// the keyword boost.
pub fn popularity_score(popularity: f64, genre_ids: &[u32], overview: &str, cfg: &ScoringConfig) -> f64 {
    let mut score = popularity;
    for boost in &cfg.genre_boosts {
        if boost.genre_ids.iter().any(|g| genre_ids.contains(g)) {
            score *= boost.factor;
        }
    }

    let lower = overview.to_lowercase();
    if cfg
        .keywords
        .iter()
        .any(|kw| !kw.is_empty() && lower.contains(&kw.to_lowercase()))
    {
        score *= cfg.keyword_factor;
    }
    score
}

pub struct Selector<'a> {
    metadata: &'a dyn MetadataService,
    pages: &'a dyn WatchPage,
    scoring: &'a ScoringConfig,
    rotation: RotationPolicy,
}

impl<'a> Selector<'a> {
    pub fn new(
        metadata: &'a dyn MetadataService,
        pages: &'a dyn WatchPage,
        scoring: &'a ScoringConfig,
        rotation: RotationPolicy,
    ) -> Self {
        Self {
            metadata,
            pages,
            scoring,
            rotation,
        }
    }

    /// Picks the next item to produce. Advances `state.rotation_counter` when
    /// (and only when) something is found; the caller persists it.
    pub async fn select_next<R: Rng>(
        &self,
        catalog: Vec<ContentItem>,
        state: &mut SchedulerState,
        rng: &mut R,
    ) -> Result<Selection> {
        let target = self.rotation.target(state.rotation_counter);
        logi(format!(
            "Target content type: {} (rotation counter {})",
            target, state.rotation_counter
        ));

        let unposted: Vec<ContentItem> = catalog
            .into_iter()
            .filter(|item| !state.is_posted(&item.id))
            .collect();

        let typed: Vec<ContentItem> = unposted.iter().filter(|i| i.kind == target).cloned().collect();
        let pool = if typed.is_empty() {
            if !unposted.is_empty() {
                logw(format!("No unposted {} found; ignoring type rotation.", target));
            }
            unposted
        } else {
            typed
        };

        if pool.is_empty() {
            logw("No unposted content available.");
            return Ok(Selection::Empty);
        }

        state.rotation_counter = self.rotation.advance(state.rotation_counter);

        let mut ranked = Vec::with_capacity(self.scoring.candidate_limit);
        for item in pool.into_iter().take(self.scoring.candidate_limit) {
            ranked.push(self.enrich(item).await);
        }

        // Stable: equal scores keep catalog order.
        ranked.sort_by(|a, b| {
            b.popularity_score
                .partial_cmp(&a.popularity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let top = ranked.len().min(self.scoring.top_pick.max(1));
        let pick = rng.gen_range(0..top);
        let chosen = ranked.swap_remove(pick);
        logi(format!(
            "Picked '{}' ({}) score {:.2} from top {}.",
            chosen.title, chosen.kind, chosen.popularity_score, top
        ));

        let chosen = self.resolve_assets(chosen).await;
        logok(format!(
            "Selected: {} (trailer: {})",
            chosen.title,
            chosen.trailer_url.as_deref().unwrap_or("none")
        ));
        Ok(Selection::Found(chosen))
    }

    /// Adds metadata-service data and the score. Lookup failures leave the
    /// item with zero popularity.
    pub async fn enrich(&self, mut item: ContentItem) -> ContentItem {
        let meta = match self.metadata.lookup(&item.title, item.kind).await {
            Ok(meta) => meta.unwrap_or_default(),
            Err(err) => {
                logw(format!("Metadata lookup failed for {}: {:#}", item.title, err));
                Default::default()
            }
        };

        item.popularity_score =
            popularity_score(meta.popularity, &meta.genre_ids, &meta.overview, self.scoring);
        if item.poster_url.is_none() {
            item.poster_url = meta.poster_url();
        }
        if item.overview.as_deref().unwrap_or("").is_empty() && !meta.overview.is_empty() {
            item.overview = Some(meta.overview);
        }
        item.genre_ids = meta.genre_ids;
        item.external_id = item.external_id.or(meta.external_id);
        item
    }

    /// Fills trailer link and overview from secondary lookups.
    pub async fn resolve_assets(&self, mut item: ContentItem) -> ContentItem {
        let page = match self.pages.inspect(&item.watch_url).await {
            Ok(page) => page,
            Err(err) => {
                logw(format!("Watch page lookup failed for {}: {:#}", item.title, err));
                Default::default()
            }
        };

        if item.trailer_url.is_none() {
            item.trailer_url = page.trailer_url;
        }
        if item.trailer_url.is_none() {
            if let Some(id) = item.external_id {
                match self.metadata.trailer_url(id, item.kind).await {
                    Ok(url) => item.trailer_url = url,
                    Err(err) => logw(format!("Trailer lookup failed for {}: {:#}", item.title, err)),
                }
            }
        }

        // Page text that beats the metadata overview is used as is; only a
        // short metadata overview gets the expand directive.
        let current = item.overview.take().unwrap_or_default();
        item.overview = Some(match page.overview {
            Some(text) if text.chars().count() > current.chars().count() => text,
            _ if current.chars().count() >= self.scoring.min_overview_chars => current,
            _ if current.is_empty() => EXPAND_DIRECTIVE.to_string(),
            _ => format!("{}\n\n{}", current, EXPAND_DIRECTIVE),
        });
        item
    }
}
