//! Soji - Automated Media Housekeeping
//!
//! A toolkit of independent media chores driven by external tools: playlist
//! audio downloads via yt-dlp, HEIC-to-PNG conversion and MP4 compression
//! via ffmpeg, plus local MP3 renaming and tagging batches. The heart of the
//! crate is the orchestration layer that streams unstructured tool output,
//! infers structured progress from it, and exposes each chore as a
//! cancellable, progress-reporting operation.

pub mod batch;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod fsops;
pub mod names;
pub mod operation;
pub mod parse;
pub mod photo;
pub mod process;
pub mod progress;
pub mod tags;
pub mod video;
pub mod workflow;
