pub mod alert;
pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod filler;
pub mod init;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod page;
pub mod resolver;
pub mod retry;
pub mod schedule;
pub mod selector;
pub mod srt;
pub mod state;
pub mod stock;
pub mod supervisor;
pub mod ytdlp;

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("[{}] {}", tag, message),
        "ERROR" => tracing::error!("[{}] {}", tag, message),
        _ => tracing::info!("[{}] {}", tag, message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}

pub(crate) fn loge(message: impl AsRef<str>) {
    logv("ERROR", message.as_ref());
}
