//! Durable JSON records for the scheduler and the viral-clip queue.
//!
//! Both records are read-modify-write with a single writer assumed. Saves go
//! through a sibling temp file and a rename so a crash never leaves a
//! half-written record behind.

use crate::error::StateError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Cadence and dedup record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    #[serde(default)]
    pub last_post_timestamp: i64,
    #[serde(default)]
    pub next_interval_seconds: i64,
    #[serde(default, deserialize_with = "deserialize_ids")]
    pub posted_ids: BTreeSet<String>,
    #[serde(default, alias = "movie_count")]
    pub rotation_counter: u32,
}

impl SchedulerState {
    pub fn is_posted(&self, id: &str) -> bool {
        self.posted_ids.contains(id)
    }
}

/// Older records stored numeric catalog ids; accept both shapes.
fn deserialize_ids<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
    let mut out = BTreeSet::new();
    for value in raw {
        match value {
            serde_json::Value::String(s) => {
                out.insert(s);
            }
            serde_json::Value::Number(n) => {
                out.insert(n.to_string());
            }
            other => {
                return Err(serde::de::Error::custom(format!(
                    "posted id must be a string or number, got {}",
                    other
                )));
            }
        }
    }
    Ok(out)
}

/// Consumption offsets and retired sources for filler footage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViralQueueState {
    #[serde(default)]
    pub tracking: BTreeMap<String, u64>,
    #[serde(default)]
    pub blacklist: BTreeSet<String>,
}

impl ViralQueueState {
    pub fn used_seconds(&self, url: &str) -> u64 {
        self.tracking.get(url).copied().unwrap_or(0)
    }

    pub fn is_blacklisted(&self, url: &str) -> bool {
        self.blacklist.contains(url)
    }

    pub fn consume(&mut self, url: &str, seconds: u64) {
        *self.tracking.entry(url.to_string()).or_insert(0) += seconds;
    }

    pub fn retire(&mut self, url: &str) {
        self.blacklist.insert(url.to_string());
    }
}

/// A JSON file holding one record of type `T`.
#[derive(Debug, Clone)]
pub struct JsonStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// `Ok(None)` when the file does not exist yet.
    pub async fn load(&self) -> Result<Option<T>, StateError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if text.trim().is_empty() {
            return Ok(Some(T::default()));
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StateError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    pub async fn load_or_default(&self) -> Result<T, StateError> {
        Ok(self.load().await?.unwrap_or_default())
    }

    pub async fn save(&self, value: &T) -> Result<(), StateError> {
        let write_err = |source| StateError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(write_err)?;
            }
        }

        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &body).await.map_err(write_err)?;
        fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }
}
