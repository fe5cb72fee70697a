use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::config::DownloadConfig;
use crate::error::{Result, SubrelayError};

/// Thin wrapper around an external media downloader (yt-dlp). It shares
/// nothing with the watch loop except the filesystem: its output directory
/// is the watch loop's input directory.
pub struct Downloader {
    config: DownloadConfig,
}

impl Downloader {
    pub fn new(config: DownloadConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, url: &str) -> Vec<String> {
        let template = Path::new(&self.config.output_dir)
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned();

        let mut args = vec![url.to_string()];
        if self.config.audio_only {
            args.extend(
                ["--extract-audio", "--audio-format", "mp3"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        } else {
            args.extend(["-f", "bv*+ba/best"].iter().map(|s| s.to_string()));
        }
        args.push("-o".to_string());
        args.push(template);

        if let Some(lang) = &self.config.subtitle_language {
            args.extend([
                "--write-subs".to_string(),
                "--sub-lang".to_string(),
                lang.clone(),
                "--convert-subs".to_string(),
                "srt".to_string(),
            ]);
        }

        args
    }

    /// Download a single URL, run to completion.
    pub async fn download(&self, url: &str) -> Result<()> {
        let args = self.build_args(url);
        debug!("Running {} {:?}", self.config.binary_path, args);

        let output = Command::new(&self.config.binary_path)
            .args(&args)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SubrelayError::Download(format!(
                    "'{}' not found on PATH",
                    self.config.binary_path
                )),
                _ => SubrelayError::Download(format!(
                    "Failed to start '{}': {}",
                    self.config.binary_path, e
                )),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SubrelayError::Download(format!(
                "Downloader exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }

    /// Download every configured URL in order. One failed URL is logged and
    /// does not stop the rest; cancellation is checked between URLs.
    pub async fn run(&self, cancel: &CancelFlag) -> Result<()> {
        if self.config.urls.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        for (i, url) in self.config.urls.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Download activity cancelled");
                break;
            }
            info!("Downloading [{}/{}]: {}", i + 1, self.config.urls.len(), url);
            match self.download(url).await {
                Ok(()) => info!("Downloaded: {}", url),
                Err(e) => warn!("Download failed for {}: {}", url, e),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(audio_only: bool, subtitle_language: Option<&str>) -> DownloadConfig {
        DownloadConfig {
            binary_path: "yt-dlp".to_string(),
            urls: Vec::new(),
            output_dir: "out".to_string(),
            audio_only,
            subtitle_language: subtitle_language.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_video_args_select_best_streams() {
        let downloader = Downloader::new(config(false, None));
        let args = downloader.build_args("https://example.com/v/1");
        assert_eq!(args[0], "https://example.com/v/1");
        assert!(args.windows(2).any(|w| w == ["-f", "bv*+ba/best"]));
        assert!(!args.contains(&"--extract-audio".to_string()));
    }

    #[test]
    fn test_audio_only_args() {
        let downloader = Downloader::new(config(true, None));
        let args = downloader.build_args("u");
        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
    }

    #[test]
    fn test_subtitle_args_request_srt_conversion() {
        let downloader = Downloader::new(config(false, Some("zh-Hans")));
        let args = downloader.build_args("u");
        assert!(args.windows(2).any(|w| w == ["--sub-lang", "zh-Hans"]));
        assert!(args.windows(2).any(|w| w == ["--convert-subs", "srt"]));
    }
}
