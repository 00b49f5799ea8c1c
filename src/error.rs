use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage a cycle is in. Used for logging and alert text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Gated,
    Selecting,
    ScriptGen,
    AudioGen,
    AssetResolving,
    Rendering,
    Publishing,
    ScheduleUpdate,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Gated => "schedule gate",
            Self::Selecting => "content selection",
            Self::ScriptGen => "script generation",
            Self::AudioGen => "audio generation",
            Self::AssetResolving => "asset resolution",
            Self::Rendering => "rendering",
            Self::Publishing => "publishing",
            Self::ScheduleUpdate => "schedule update",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("no visual asset available for '{title}' after trailer, stock and slideshow tiers")]
    Unavailable { title: String },
}

/// A failure that ends the cycle with a non-zero exit.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct CycleError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

impl CycleError {
    pub fn new(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// Critical failures exit non-zero. A failed upload still advances the
    /// schedule and is reported as a partial success.
    pub fn is_critical(&self) -> bool {
        self.stage != Stage::Publishing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_publishing_failures_are_soft() {
        let upload = CycleError::new(Stage::Publishing, anyhow::anyhow!("rejected"));
        assert!(!upload.is_critical());

        let assets = CycleError::new(
            Stage::AssetResolving,
            AssetError::Unavailable { title: "Heat".into() },
        );
        assert!(assets.is_critical());
        assert_eq!(
            assets.to_string(),
            "asset resolution failed: no visual asset available for 'Heat' after trailer, stock and slideshow tiers"
        );
    }
}
