//! Subrelay - Subtitle Merge-and-Sync Pipeline
//!
//! Watches a directory for new subtitle files, merges sub-sentence cue
//! fragments into sentences, translates them through an external CLI engine,
//! and publishes the result to a remote content store.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod merge;
pub mod remote;
pub mod subtitle;
pub mod translate;
pub mod watch;
