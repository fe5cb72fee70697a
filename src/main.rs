//! Subrelay - Subtitle Merge-and-Sync Pipeline
//!
//! Entry point wiring the watch loop, the one-shot commands, and the
//! download activity together from CLI flags and the TOML configuration.

use anyhow::Result;
use clap::Parser;
use std::io::Write as _;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subrelay::cancel::CancelFlag;
use subrelay::cli::{Args, Commands};
use subrelay::config::{Config, FallbackPolicy};
use subrelay::download::Downloader;
use subrelay::error::SubrelayError;
use subrelay::merge;
use subrelay::remote::RemotePublisher;
use subrelay::subtitle::{parse_srt, render_srt, TranslationMap};
use subrelay::translate::{translate_blocks, EngineFactory};
use subrelay::watch::WatchLoop;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Watch {
            input_dir,
            language,
            remote_dir,
            token,
        } => {
            let token = resolve_token(token)?;
            if let Some(dir) = input_dir {
                config.watch.input_dir = dir.to_string_lossy().into_owned();
            }
            if let Some(lang) = language {
                config.translate.target_language = lang;
            }

            // The remote target directory must be settled before anything
            // else; it doubles as the context-seeding source
            let target_dir = match remote_dir {
                Some(dir) => dir,
                None if !config.remote.target_dir.is_empty() => config.remote.target_dir.clone(),
                None => {
                    let publisher = RemotePublisher::new(config.remote.clone(), token.clone())?;
                    select_remote_dir(&publisher).await?
                }
            };
            config.remote.target_dir = target_dir.trim_matches('/').to_string();

            let publisher = RemotePublisher::new(config.remote.clone(), token)?;

            info!(
                "Seeding context directory from remote '{}'",
                display_dir(&config.remote.target_dir)
            );
            let context_dir = PathBuf::from(&config.watch.context_dir);
            match publisher
                .download_srt_files(&config.remote.target_dir, &context_dir)
                .await
            {
                Ok(count) => info!("Fetched {} context files", count),
                Err(e) => warn!("Context seeding failed, continuing without: {}", e),
            }

            let cancel = CancelFlag::new();
            spawn_ctrl_c_handler(cancel.clone());

            let engine = EngineFactory::create_engine(config.translate.clone());
            let downloader = Downloader::new(config.download.clone());
            let mut watch_loop =
                WatchLoop::new(config.clone(), engine, publisher, cancel.clone());

            // The download activity and the watch loop share only the
            // filesystem and the stop flag
            let (watch_result, download_result) =
                tokio::join!(watch_loop.run(), downloader.run(&cancel));
            download_result?;
            watch_result?;
        }

        Commands::Merge {
            input,
            output,
            gap_ms,
        } => {
            require_file(&input)?;
            let gap = gap_ms.unwrap_or(config.merge.gap_threshold_ms);
            let content = tokio::fs::read_to_string(&input).await?;
            let cues = parse_srt(&content)?;
            let blocks = merge::merge(&cues, gap);
            let rendered = render_srt(&blocks, &TranslationMap::new(), &FallbackPolicy::Original);
            tokio::fs::write(&output, rendered).await?;
            info!(
                "Merged {} cues into {} blocks: {}",
                cues.len(),
                blocks.len(),
                output.display()
            );
        }

        Commands::Translate {
            input,
            output,
            language,
        } => {
            require_file(&input)?;
            if let Some(lang) = language {
                config.translate.target_language = lang;
            }

            let content = tokio::fs::read_to_string(&input).await?;
            let cues = parse_srt(&content)?;
            let blocks = merge::merge(&cues, config.merge.gap_threshold_ms);

            let context_dir = PathBuf::from(&config.watch.context_dir);
            tokio::fs::create_dir_all(&context_dir).await?;

            let engine = EngineFactory::create_engine(config.translate.clone());
            let translations = translate_blocks(
                engine.as_ref(),
                &blocks,
                &config.translate.target_language,
                &context_dir,
            )
            .await?;

            let rendered = render_srt(&blocks, &translations, &config.translate.fallback);
            tokio::fs::write(&output, rendered).await?;
            info!(
                "Translated {} blocks to {}: {}",
                blocks.len(),
                config.translate.target_language,
                output.display()
            );
        }

        Commands::Publish {
            input,
            remote_path,
            message,
            token,
        } => {
            require_file(&input)?;
            let token = resolve_token(token)?;
            let publisher = RemotePublisher::new(config.remote.clone(), token)?;

            let content = tokio::fs::read(&input).await?;
            let message = message.unwrap_or_else(|| {
                format!(
                    "Update {}",
                    input
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| remote_path.clone())
                )
            });
            publisher
                .upsert(remote_path.trim_start_matches('/'), &content, &message)
                .await?;
        }

        Commands::RemoteDirs { token } => {
            let token = resolve_token(token)?;
            let publisher = RemotePublisher::new(config.remote.clone(), token)?;

            let dirs = publisher.list_dirs_recursive("").await?;
            println!("Directories in {}:", config.remote.repo_url);
            for (idx, dir) in dirs.iter().enumerate() {
                println!("{}. {}", idx, display_dir(dir));
            }
        }

        Commands::Download { urls } => {
            if !urls.is_empty() {
                config.download.urls = urls;
            }
            if config.download.urls.is_empty() {
                return Err(SubrelayError::Config(
                    "No download URLs given on the command line or in the config".to_string(),
                )
                .into());
            }

            let cancel = CancelFlag::new();
            spawn_ctrl_c_handler(cancel.clone());

            let downloader = Downloader::new(config.download.clone());
            downloader.run(&cancel).await?;
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let subrelay_dir = std::env::current_dir()?.join(".subrelay");
    let log_dir = subrelay_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "subrelay.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer().with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer);

    subscriber
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn spawn_ctrl_c_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested, finishing in-flight work...");
            cancel.cancel();
        }
    });
}

/// Token from the CLI flag (or SUBRELAY_TOKEN via clap), with GITHUB_TOKEN
/// as a fallback. Never embedded in configuration files.
fn resolve_token(flag: Option<String>) -> Result<String> {
    flag.or_else(|| std::env::var("GITHUB_TOKEN").ok())
        .ok_or_else(|| {
            anyhow::anyhow!("Provide a token via --token, SUBRELAY_TOKEN, or GITHUB_TOKEN")
        })
}

fn require_file(path: &std::path::Path) -> Result<()> {
    if !path.is_file() {
        return Err(SubrelayError::FileNotFound(path.display().to_string()).into());
    }
    Ok(())
}

fn display_dir(dir: &str) -> &str {
    if dir.is_empty() {
        "/ (root)"
    } else {
        dir
    }
}

/// Print the recursive folder menu and read the user's selection.
async fn select_remote_dir(publisher: &RemotePublisher) -> Result<String> {
    let location = publisher.location();
    println!(
        "Fetching directory list for {}/{} (branch {})...",
        location.owner, location.repo, location.branch
    );

    let dirs = publisher.list_dirs_recursive("").await?;
    for (idx, dir) in dirs.iter().enumerate() {
        println!("{}. {}", idx, display_dir(dir));
    }

    loop {
        print!("Select the directory holding the subtitle files [0]: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(dirs[0].clone());
        }
        match line.parse::<usize>() {
            Ok(choice) if choice < dirs.len() => return Ok(dirs[choice].clone()),
            _ => println!("Invalid choice, try again."),
        }
    }
}
