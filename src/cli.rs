use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch a directory, translating and publishing each new subtitle file
    Watch {
        /// Local directory polled for .srt files
        #[arg(short, long)]
        input_dir: Option<PathBuf>,

        /// Target language code (e.g., vi, en)
        #[arg(short, long)]
        language: Option<String>,

        /// Remote directory to publish into; omit to pick interactively
        #[arg(long)]
        remote_dir: Option<String>,

        /// Access token for the remote store
        #[arg(long, env = "SUBRELAY_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Merge sub-sentence cue fragments of a subtitle file into sentences
    Merge {
        /// Input subtitle file
        #[arg(short, long)]
        input: PathBuf,

        /// Output subtitle file
        #[arg(short, long)]
        output: PathBuf,

        /// Maximum silence between cues of one sentence, in milliseconds
        #[arg(long)]
        gap_ms: Option<u64>,
    },

    /// Merge and translate one subtitle file without publishing
    Translate {
        /// Input subtitle file
        #[arg(short, long)]
        input: PathBuf,

        /// Output subtitle file
        #[arg(short, long)]
        output: PathBuf,

        /// Target language code
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Publish one local file to the remote store
    Publish {
        /// Local file to upload
        #[arg(short, long)]
        input: PathBuf,

        /// Remote path, relative to the repository root
        #[arg(short, long)]
        remote_path: String,

        /// Commit message for the write
        #[arg(short, long)]
        message: Option<String>,

        /// Access token for the remote store
        #[arg(long, env = "SUBRELAY_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// List the remote repository's directories
    RemoteDirs {
        /// Access token for the remote store
        #[arg(long, env = "SUBRELAY_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Run the media downloader once
    Download {
        /// URLs to download; omit to use the configured list
        urls: Vec<String>,
    },
}
