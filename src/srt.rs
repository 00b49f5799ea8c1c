use crate::models::WordTiming;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// `HH:MM:SS,mmm`, clamped at zero.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_s / 3600,
        (total_s % 3600) / 60,
        total_s % 60,
        ms
    )
}

/// Groups timed words into short cues of at most `words_per_cue` words.
pub fn words_to_srt(words: &[WordTiming], words_per_cue: usize) -> String {
    let mut out = String::new();
    let usable: Vec<&WordTiming> = words
        .iter()
        .filter(|w| !w.word.trim().is_empty() && w.end >= w.start)
        .collect();

    for (index, chunk) in usable.chunks(words_per_cue.max(1)).enumerate() {
        let (Some(first), Some(last)) = (chunk.first(), chunk.last()) else {
            continue;
        };
        let text = chunk
            .iter()
            .map(|w| w.word.trim())
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_timestamp(first.start),
            format_timestamp(last.end),
            text
        ));
    }
    out
}

/// Writes cues for `words`. Returns false when there was nothing to write.
pub async fn write_srt(words: &[WordTiming], words_per_cue: usize, path: &Path) -> Result<bool> {
    let body = words_to_srt(words, words_per_cue);
    if body.is_empty() {
        return Ok(false);
    }

    let mut out = fs::File::create(path)
        .await
        .with_context(|| format!("create srt output: {}", path.display()))?;
    out.write_all(body.as_bytes()).await?;
    out.flush().await.ok();
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(w: &str, start: f64, end: f64) -> WordTiming {
        WordTiming {
            word: w.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn timestamps_roll_over_units() {
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_timestamp(3723.4567), "01:02:03,457");
        assert_eq!(format_timestamp(-2.0), "00:00:00,000");
    }

    #[test]
    fn words_are_grouped_into_cues() {
        let words = vec![
            word("one", 0.0, 0.4),
            word("two", 0.4, 0.8),
            word("three", 0.8, 1.2),
            word("four", 1.3, 1.9),
        ];
        let srt = words_to_srt(&words, 3);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,200\none two three\n\n2\n00:00:01,300 --> 00:00:01,900\nfour\n\n"
        );
    }

    #[test]
    fn blank_words_are_skipped() {
        let words = vec![word(" ", 0.0, 0.1), word("hi", 0.1, 0.3)];
        assert!(words_to_srt(&words, 2).starts_with("1\n00:00:00,100"));
        assert!(words_to_srt(&[], 3).is_empty());
    }

    #[tokio::test]
    async fn empty_alignment_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("subs.srt");
        assert!(!write_srt(&[], 3, &path).await.unwrap());
        assert!(!path.exists());
    }
}
