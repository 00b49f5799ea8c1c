use crate::config::OpenAiConfig;
use crate::models::{ContentKind, Script, WordTiming};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const MAX_OVERVIEW_CHARS: usize = 12_000;

/// What the script generator gets to work with.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRequest {
    pub title: String,
    pub kind: ContentKind,
    pub overview: String,
    pub site_url: String,
}

#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    /// Errors only once every configured model has failed.
    async fn generate(&self, request: &ScriptRequest) -> Result<Script>;
}

#[async_trait]
pub trait Aligner: Send + Sync {
    async fn align(&self, audio: &Path) -> Result<Vec<WordTiming>>;
}

fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

fn openai_extract_output_text(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error").filter(|e| !e.is_null()) {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error message: {}", msg));
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error code: {}", code));
        }
        return None;
    }

    let output = root.get("output")?.as_array()?;
    for item in output {
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for entry in content {
            let typ = entry.get("type").and_then(|v| v.as_str());
            if typ == Some("output_text") {
                if let Some(text) = entry.get("text").and_then(|v| v.as_str()) {
                    return Some(text.to_string());
                }
            }
        }
    }

    None
}

#[derive(Debug, Deserialize)]
struct ScriptPayload {
    #[serde(default)]
    script: String,
    #[serde(default)]
    caption: String,
}

fn clean_spoken_text(text: &str) -> String {
    text.replace(['*', '#', '_'], "").trim().to_string()
}

/// Parses the model's JSON reply. A reply without a script body is unusable.
fn parse_script(text: &str, request: &ScriptRequest) -> Option<Script> {
    let payload: ScriptPayload = serde_json::from_str(text.trim()).ok()?;
    let body = clean_spoken_text(&payload.script);
    if body.is_empty() {
        return None;
    }
    let caption = match payload.caption.trim() {
        "" => format!("{} 🎬", request.title),
        c => c.to_string(),
    };
    Some(Script { body, caption })
}

fn build_prompt(request: &ScriptRequest) -> String {
    let kind = match request.kind {
        ContentKind::Movie => "movie",
        ContentKind::Series => "series",
    };
    format!(
        "Act as a viral content creator. Write a short, engaging Reels script (under 60 seconds spoken) in Egyptian Arabic slang (Ammiya) for the {kind} \"{title}\".\n\
         Overview: {overview}\n\n\
         Structure:\n\
         1. Hook: one catchy opening sentence.\n\
         2. Body: the premise told in an exciting way, no major spoilers.\n\
         3. Call to action: end with \"تابعوا المزيد على {site}\".\n\n\
         Return STRICT JSON ONLY: {{\"script\": \"<spoken text, no headers, no markdown>\", \"caption\": \"<post caption with 3-5 hashtags>\"}}\n",
        kind = kind,
        title = request.title,
        overview = trim_copy_utf8_safe(&request.overview, MAX_OVERVIEW_CHARS),
        site = request.site_url,
    )
}

pub struct OpenAiScriptWriter {
    client: Client,
    cfg: OpenAiConfig,
}

impl OpenAiScriptWriter {
    pub fn new(client: Client, cfg: OpenAiConfig) -> Self {
        Self { client, cfg }
    }

    async fn try_model(&self, model: &str, request: &ScriptRequest) -> Result<Option<Script>> {
        let body = json!({
            "model": model,
            "input": [
                {"role": "system", "content": "You are a helpful assistant designed to output JSON."},
                {"role": "user", "content": build_prompt(request)},
            ],
            "text": {"format": {"type": "json_object"}},
        });

        let resp = self
            .client
            .post(RESPONSES_URL)
            .bearer_auth(&self.cfg.openai_key)
            .json(&body)
            .timeout(Duration::from_secs(600))
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            logw(format!("OpenAI HTTP {} from {}", status.as_u16(), model));
            if !raw.is_empty() {
                logw(format!("OpenAI raw body: {}", raw.chars().take(800).collect::<String>()));
            }
            return Ok(None);
        }

        let Some(text) = openai_extract_output_text(&raw) else {
            logw(format!("OpenAI response from {} had no output text.", model));
            return Ok(None);
        };
        Ok(parse_script(&text, request))
    }
}

#[async_trait]
impl ScriptGenerator for OpenAiScriptWriter {
    async fn generate(&self, request: &ScriptRequest) -> Result<Script> {
        for model in &self.cfg.script_models {
            logi(format!("Generating script for {} with {}", request.title, model));
            match self.try_model(model, request).await {
                Ok(Some(script)) => {
                    logok(format!("Script ready ({} chars) from {}", script.body.chars().count(), model));
                    return Ok(script);
                }
                Ok(None) => logw(format!("Model {} returned no usable script.", model)),
                Err(err) => logw(format!("Model {} failed: {:#}", model, err)),
            }
        }
        anyhow::bail!(
            "all script models failed ({})",
            self.cfg.script_models.join(", ")
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct Transcription {
    #[serde(default)]
    words: Vec<WordTiming>,
}

fn parse_words(raw: &str) -> Result<Vec<WordTiming>> {
    let parsed: Transcription = serde_json::from_str(raw).context("transcription parse failed")?;
    Ok(parsed
        .words
        .into_iter()
        .map(|w| WordTiming {
            word: w.word.trim().to_string(),
            start: w.start,
            end: w.end,
        })
        .filter(|w| !w.word.is_empty())
        .collect())
}

/// Word timings from the transcription endpoint.
pub struct OpenAiAligner {
    client: Client,
    cfg: OpenAiConfig,
}

impl OpenAiAligner {
    pub fn new(client: Client, cfg: OpenAiConfig) -> Self {
        Self { client, cfg }
    }
}

#[async_trait]
impl Aligner for OpenAiAligner {
    async fn align(&self, audio: &Path) -> Result<Vec<WordTiming>> {
        let bytes = fs::read(audio)
            .await
            .with_context(|| format!("reading narration {}", audio.display()))?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "narration.m4a".to_string());

        let form = Form::new()
            .text("model", self.cfg.transcription_model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word")
            .text("language", self.cfg.language.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let resp = self
            .client
            .post(TRANSCRIPTIONS_URL)
            .bearer_auth(&self.cfg.openai_key)
            .multipart(form)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .context("transcription request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!(
                "transcription HTTP {}: {}",
                status.as_u16(),
                raw.chars().take(400).collect::<String>()
            );
        }
        let words = parse_words(&raw)?;
        logi(format!("Aligned {} words", words.len()));
        Ok(words)
    }
}
