use crate::config::ElevenLabsConfig;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Responses smaller than this are error payloads, not audio.
const MIN_AUDIO_BYTES: u64 = 512;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Writes speech for `text` to `out`. `Ok(false)` when the segment could
    /// not be voiced and should be skipped.
    async fn synthesize(&self, text: &str, out: &Path) -> Result<bool>;
}

pub async fn elevenlabs_tts_to_mp3(
    client: &Client,
    cfg: &ElevenLabsConfig,
    text: &str,
    out_mp3_path: &Path,
) -> Result<bool> {
    let url = format!(
        "https://api.elevenlabs.io/v1/text-to-speech/{}?output_format=mp3_44100_128",
        cfg.eleven_voice_id
    );

    let body = serde_json::json!({
        "text": text,
        "model_id": cfg.eleven_model_id,
    });

    let resp = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("xi-api-key", &cfg.elevenlabs_key)
        .json(&body)
        .timeout(Duration::from_secs(300))
        .send()
        .await
        .context("ElevenLabs request failed")?;

    if !resp.status().is_success() {
        logw(format!("ElevenLabs TTS failed HTTP {}", resp.status().as_u16()));
        return Ok(false);
    }

    let bytes = resp.bytes().await.context("ElevenLabs response read failed")?;
    if (bytes.len() as u64) < MIN_AUDIO_BYTES {
        logw(format!("ElevenLabs returned only {} bytes", bytes.len()));
        return Ok(false);
    }
    if let Some(parent) = out_mp3_path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create dir {}", parent.display()))?;
    }
    fs::write(out_mp3_path, &bytes).await?;

    Ok(fs::metadata(out_mp3_path).await.is_ok())
}

pub struct ElevenLabsVoice {
    client: Client,
    cfg: ElevenLabsConfig,
}

impl ElevenLabsVoice {
    pub fn new(client: Client, cfg: ElevenLabsConfig) -> Self {
        Self { client, cfg }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsVoice {
    async fn synthesize(&self, text: &str, out: &Path) -> Result<bool> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        elevenlabs_tts_to_mp3(&self.client, &self.cfg, text, out).await
    }
}
