use crate::config::PathsConfig;
use crate::{logi, logw};
use anyhow::{Context, Result};
use tokio::fs;

/// External programs the pipeline shells out to.
pub const REQUIRED_TOOLS: &[&str] = &["ffmpeg", "ffprobe", "yt-dlp"];

/// Creates the work, output and state directories named in `paths`.
pub async fn ensure_directories(paths: &PathsConfig) -> Result<()> {
    let mut dirs = vec![paths.work_dir.as_path(), paths.output_dir.as_path()];
    for file in [&paths.state_file, &paths.viral_state_file] {
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            dirs.push(parent);
        }
    }

    for dir in dirs {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

async fn tool_available(tool: &str) -> bool {
    let flag = if tool == "yt-dlp" { "--version" } else { "-version" };
    match tokio::process::Command::new(tool).arg(flag).output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Names of required tools missing from PATH.
pub async fn check_tools() -> Vec<&'static str> {
    let mut missing = Vec::new();
    for tool in REQUIRED_TOOLS {
        if !tool_available(tool).await {
            logw(format!("{} not found in PATH.", tool));
            missing.push(*tool);
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_configured_directories() {
        let dir = TempDir::new().unwrap();
        let paths = PathsConfig {
            work_dir: dir.path().join("temp"),
            output_dir: dir.path().join("out/reels"),
            state_file: dir.path().join("state/bot_state.json"),
            viral_state_file: dir.path().join("viral_state.json"),
            ..Default::default()
        };
        ensure_directories(&paths).await.unwrap();
        assert!(paths.work_dir.is_dir());
        assert!(paths.output_dir.is_dir());
        assert!(dir.path().join("state").is_dir());

        ensure_directories(&paths).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_tools_are_unavailable() {
        assert!(!tool_available("definitely-not-a-real-tool-xyz").await);
    }
}
