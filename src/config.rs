use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SubrelayError};

fn default_gap_threshold_ms() -> u64 {
    700
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_request_delay_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub watch: WatchConfig,
    pub merge: MergeConfig,
    pub translate: TranslateConfig,
    pub remote: RemoteConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Local directory polled for new subtitle files
    pub input_dir: String,
    /// Local directory holding prior translations, fed to the engine as context
    pub context_dir: String,
    /// Seconds between directory polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Maximum silence (ms) between two cues for them to still belong
    /// to the same sentence
    #[serde(default = "default_gap_threshold_ms")]
    pub gap_threshold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Path to the translation engine binary (e.g., gemini)
    pub binary_path: String,
    /// Target language code (e.g., vi, en)
    pub target_language: String,
    /// What to emit for a block the engine returned no translation for
    #[serde(default)]
    pub fallback: FallbackPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum FallbackPolicy {
    /// Keep the block's original text
    #[default]
    Original,
    /// Prefix the original text with a visible failure tag
    Marker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Repository URL, optionally with /tree/<branch>
    pub repo_url: String,
    /// Remote directory the translated files are published into
    #[serde(default)]
    pub target_dir: String,
    /// Fixed delay between listing calls while enumerating folders
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Retries for transient publish failures
    pub max_retries: u32,
    /// Linear backoff step between retries
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Path to the downloader binary
    pub binary_path: String,
    /// Media URLs fetched concurrently with the watch loop; empty disables
    /// the download activity
    #[serde(default)]
    pub urls: Vec<String>,
    /// Directory the downloader writes into (the watch loop's input)
    pub output_dir: String,
    /// Extract audio only instead of best video+audio
    #[serde(default)]
    pub audio_only: bool,
    /// Also fetch subtitles in this language, converted to SRT
    #[serde(default)]
    pub subtitle_language: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch: WatchConfig {
                input_dir: "input_srt".to_string(),
                context_dir: "context_srt".to_string(),
                poll_interval_secs: default_poll_interval_secs(),
            },
            merge: MergeConfig {
                gap_threshold_ms: default_gap_threshold_ms(),
            },
            translate: TranslateConfig {
                binary_path: "gemini".to_string(),
                target_language: "vi".to_string(),
                fallback: FallbackPolicy::Original,
            },
            remote: RemoteConfig {
                repo_url: String::new(),
                target_dir: String::new(),
                request_delay_ms: default_request_delay_ms(),
                max_retries: 3,
                retry_backoff_ms: 500,
            },
            download: DownloadConfig {
                binary_path: "yt-dlp".to_string(),
                urls: Vec::new(),
                output_dir: "input_srt".to_string(),
                audio_only: false,
                subtitle_language: None,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SubrelayError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| SubrelayError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SubrelayError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SubrelayError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
