use std::collections::HashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::config::FallbackPolicy;
use crate::error::{Result, SubrelayError};
use crate::merge::MergedBlock;

/// One timed caption entry. Timestamps are milliseconds from media start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Translated text keyed by block index; missing keys fall back per policy.
pub type TranslationMap = HashMap<usize, String>;

static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}):(\d{2}):(\d{2})[,.](\d{3})$").unwrap());

/// Parse `HH:MM:SS,mmm` (or `HH:MM:SS.mmm`) into milliseconds.
///
/// Returns None for anything malformed. Callers decide what to do with a
/// bad timestamp; it is never silently treated as zero, since a zero start
/// would corrupt gap-based merge decisions downstream.
pub fn parse_timestamp(text: &str) -> Option<u64> {
    let caps = TIMESTAMP_RE.captures(text.trim())?;
    let h: u64 = caps[1].parse().ok()?;
    let m: u64 = caps[2].parse().ok()?;
    let s: u64 = caps[3].parse().ok()?;
    let ms: u64 = caps[4].parse().ok()?;
    Some(h * 3_600_000 + m * 60_000 + s * 1_000 + ms)
}

/// Format milliseconds as the canonical `HH:MM:SS,mmm`.
pub fn format_timestamp(total_ms: u64) -> String {
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Parse raw SRT text into ordered cues.
///
/// Line endings are normalized, blocks are split on blank lines, and the
/// source index line is ignored in favor of sequence-assigned indices.
/// A block without an arrow-separated timing line is dropped silently
/// (malformed trailing blocks are common); a block whose timestamps do not
/// parse is dropped with a warning. Only an empty input is an error.
pub fn parse_srt(content: &str) -> Result<Vec<Cue>> {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return Err(SubrelayError::Parse("empty subtitle input".to_string()));
    }

    let mut cues = Vec::new();
    for block in trimmed.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let lines: Vec<&str> = block.lines().collect();
        if lines.len() < 2 || !lines[1].contains("-->") {
            continue;
        }

        let Some((start_str, rest)) = lines[1].split_once("-->") else {
            continue;
        };
        // Cue settings after the end timestamp are discarded
        let end_str = rest.trim().split_whitespace().next().unwrap_or("");

        let (Some(start_ms), Some(end_ms)) =
            (parse_timestamp(start_str), parse_timestamp(end_str))
        else {
            warn!("Dropping cue with malformed timestamp line: {}", lines[1]);
            continue;
        };

        cues.push(Cue {
            index: cues.len() + 1,
            start_ms,
            end_ms,
            text: lines[2..].join("\n").trim().to_string(),
        });
    }

    Ok(cues)
}

/// Render merged blocks back to canonical SRT text.
///
/// Each block becomes `index\nstart --> end\ntext\n`, with exactly one
/// blank line between blocks, so the output round-trips through
/// [`parse_srt`] losslessly for timing and text.
pub fn render_srt(
    blocks: &[MergedBlock],
    translations: &TranslationMap,
    fallback: &FallbackPolicy,
) -> String {
    let rendered: Vec<String> = blocks
        .iter()
        .map(|block| {
            let text = match translations.get(&block.index) {
                Some(translated) => translated.clone(),
                None => match fallback {
                    FallbackPolicy::Original => block.text.clone(),
                    FallbackPolicy::Marker => {
                        format!("[translation failed] {}", block.text)
                    }
                },
            };
            format!(
                "{}\n{} --> {}\n{}\n",
                block.index,
                format_timestamp(block.start_ms),
                format_timestamp(block.end_ms),
                text
            )
        })
        .collect();

    rendered.join("\n")
}
