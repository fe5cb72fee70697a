use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cancel::CancelFlag;
use crate::config::Config;
use crate::error::{Result, SubrelayError};
use crate::merge;
use crate::remote::RemotePublisher;
use crate::subtitle::{parse_srt, render_srt};
use crate::translate::{self, TranslationEngine};

/// Polls the input directory and drives the per-file pipeline:
/// parse, merge, translate, render, publish.
///
/// A file enters the processed set whether or not its pipeline succeeded:
/// at most one attempt per run, never a retry storm. Restarting the process
/// clears the set, but files whose translated output already exists in the
/// context directory are skipped anyway.
pub struct WatchLoop {
    config: Config,
    engine: Box<dyn TranslationEngine>,
    publisher: RemotePublisher,
    cancel: CancelFlag,
    processed: HashSet<String>,
}

impl WatchLoop {
    pub fn new(
        config: Config,
        engine: Box<dyn TranslationEngine>,
        publisher: RemotePublisher,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            config,
            engine,
            publisher,
            cancel,
            processed: HashSet::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let input_dir = PathBuf::from(&self.config.watch.input_dir);
        let context_dir = PathBuf::from(&self.config.watch.context_dir);
        tokio::fs::create_dir_all(&input_dir).await?;
        tokio::fs::create_dir_all(&context_dir).await?;

        info!(
            "Watching {} for new subtitle files (poll every {}s)",
            input_dir.display(),
            self.config.watch.poll_interval_secs
        );

        while !self.cancel.is_cancelled() {
            match find_srt_files(&input_dir) {
                Ok(files) => self.process_batch(&files, &context_dir).await,
                // Transient listing failure; try again on the next poll
                Err(e) => warn!("Directory scan failed: {}", e),
            }

            self.sleep_between_polls().await;
        }

        info!("Watch loop stopped");
        Ok(())
    }

    async fn process_batch(&mut self, files: &[PathBuf], context_dir: &Path) {
        for path in files {
            if self.cancel.is_cancelled() {
                break;
            }

            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            if self.processed.contains(&name) {
                continue;
            }

            let output_name = output_filename(&name, &self.config.translate.target_language);
            let context_path = context_dir.join(&output_name);
            if context_path.exists() {
                debug!("Output already exists for {}, skipping", name);
                self.processed.insert(name);
                continue;
            }

            info!("Processing: {}", name);
            let result = self.process_file(path, &output_name, &context_path).await;
            // Marked processed regardless of outcome: one attempt per run
            self.processed.insert(name.clone());

            match result {
                Ok(()) => info!("Finished: {} -> {}", name, output_name),
                Err(e) => warn!("Failed to process {}: {}", name, e),
            }
        }
    }

    async fn process_file(
        &self,
        path: &Path,
        output_name: &str,
        context_path: &Path,
    ) -> Result<()> {
        let content = tokio::fs::read_to_string(path).await?;
        let cues = parse_srt(&content)?;
        let blocks = merge::merge(&cues, self.config.merge.gap_threshold_ms);
        if blocks.is_empty() {
            return Err(SubrelayError::Parse(format!(
                "no usable cues in {}",
                path.display()
            )));
        }

        let context_dir = Path::new(&self.config.watch.context_dir);
        let translations = translate::translate_blocks(
            self.engine.as_ref(),
            &blocks,
            &self.config.translate.target_language,
            context_dir,
        )
        .await?;

        let rendered = render_srt(&blocks, &translations, &self.config.translate.fallback);

        // Saved locally first so it grounds future translations even if the
        // publish step fails
        tokio::fs::write(context_path, &rendered).await?;

        let remote_path = self.publisher.target_path(output_name);
        let message = format!(
            "Translate {} to {}",
            output_name, self.config.translate.target_language
        );
        self.publisher
            .upsert(&remote_path, rendered.as_bytes(), &message)
            .await?;

        Ok(())
    }

    /// Sleep the poll interval in short steps so cancellation stays responsive.
    async fn sleep_between_polls(&self) {
        let mut remaining_ms = self.config.watch.poll_interval_secs * 1_000;
        while remaining_ms > 0 && !self.cancel.is_cancelled() {
            let step = remaining_ms.min(250);
            sleep(Duration::from_millis(step)).await;
            remaining_ms -= step;
        }
    }
}

/// Immediate `.srt` children of a directory, sorted by name.
pub fn find_srt_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).max_depth(1).into_iter() {
        let entry = entry.map_err(|e| {
            SubrelayError::Io(std::io::Error::other(format!(
                "listing {} failed: {}",
                dir.display(),
                e
            )))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_srt = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("srt"));
        if is_srt {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Output name for a translated file: `<stem>.<lang>.<ext>`.
pub fn output_filename(input_name: &str, language: &str) -> String {
    match input_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}.{}.{}", stem, language, ext),
        None => format!("{}.{}.srt", input_name, language),
    }
}
