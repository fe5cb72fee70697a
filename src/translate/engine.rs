use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::TranslationEngine;
use crate::config::TranslateConfig;
use crate::error::{Result, SubrelayError};

/// Engine backed by an external CLI binary (e.g., gemini). The prompt goes
/// in on stdin, the context directory is passed as an include argument, and
/// stdout is captured as the raw response.
pub struct CliEngine {
    config: TranslateConfig,
}

impl CliEngine {
    pub fn new(config: TranslateConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TranslationEngine for CliEngine {
    async fn translate(&self, prompt: &str, context_dir: &Path) -> Result<String> {
        debug!(
            "Invoking translation engine: {} (context: {})",
            self.config.binary_path,
            context_dir.display()
        );

        let mut child = Command::new(&self.config.binary_path)
            .arg("-a")
            .arg("--include-directories")
            .arg(context_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SubrelayError::EngineUnavailable(
                    format!("'{}' not found on PATH", self.config.binary_path),
                ),
                _ => SubrelayError::EngineFailure(format!(
                    "Failed to start '{}': {}",
                    self.config.binary_path, e
                )),
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            SubrelayError::EngineFailure("Engine stdin was not captured".to_string())
        })?;
        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| SubrelayError::EngineFailure(format!("Failed to write prompt: {}", e)))?;
        // Close stdin so the engine sees end of input
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SubrelayError::EngineFailure(format!("Engine did not complete: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SubrelayError::EngineFailure(format!(
                "Engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
