use crate::config::ScheduleConfig;
use crate::error::StateError;
use crate::logi;
use crate::state::{JsonStore, SchedulerState};
use rand::Rng;

pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// True when enough time has passed since the last post.
pub fn is_due(state: &SchedulerState, now: i64) -> bool {
    now - state.last_post_timestamp >= state.next_interval_seconds
}

/// Scheduling gate. The first run persists a zeroed record and always proceeds.
pub async fn should_proceed(
    store: &JsonStore<SchedulerState>,
    force: bool,
    now: i64,
) -> Result<bool, StateError> {
    if force {
        logi("Force flag set; bypassing schedule gate.");
        return Ok(true);
    }

    let state = match store.load().await? {
        Some(state) => state,
        None => {
            logi(format!(
                "No scheduler state at {}; first run proceeds.",
                store.path().display()
            ));
            store.save(&SchedulerState::default()).await?;
            return Ok(true);
        }
    };

    let elapsed = now - state.last_post_timestamp;
    if is_due(&state, now) {
        logi(format!(
            "Post is due (elapsed {}s >= interval {}s).",
            elapsed, state.next_interval_seconds
        ));
        Ok(true)
    } else {
        logi(format!(
            "Not due yet: {}s elapsed of {}s ({}s remaining).",
            elapsed,
            state.next_interval_seconds,
            state.next_interval_seconds - elapsed
        ));
        Ok(false)
    }
}

pub fn random_interval<R: Rng>(cfg: &ScheduleConfig, rng: &mut R) -> i64 {
    rng.gen_range(cfg.min_interval_secs..=cfg.max_interval_secs)
}

/// Applies the post-publish transition. The slot always advances; the id is
/// recorded only when the upload was confirmed.
pub fn record_publish_attempt<R: Rng>(
    state: &mut SchedulerState,
    item_id: &str,
    published: bool,
    cfg: &ScheduleConfig,
    now: i64,
    rng: &mut R,
) {
    state.last_post_timestamp = state.last_post_timestamp.max(now);
    state.next_interval_seconds = random_interval(cfg, rng);
    if published {
        state.posted_ids.insert(item_id.to_string());
    }
}
