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
    /// Download a playlist as MP3 audio via yt-dlp
    Download {
        /// Playlist or video URL
        #[arg(short, long)]
        url: String,

        /// Maximum number of items to download
        #[arg(short, long)]
        max_items: Option<u32>,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Compress an MP4 video with ffmpeg
    Compress {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Output video file (default: <input>_compressed.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert HEIC photos in a folder to PNG
    ConvertPhotos {
        /// Folder containing HEIC files
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Clean up and rename downloaded MP3 file names
    FixNames {
        /// Folder containing MP3 files
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Write title/artist/album tags derived from MP3 file names
    Tag {
        /// Folder containing MP3 files
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Move MP3 files from one folder to another
    MoveAudio {
        /// Source folder
        #[arg(short, long)]
        source: PathBuf,

        /// Target folder (created if missing)
        #[arg(short, long)]
        target: PathBuf,
    },

    /// Delete a work folder and everything in it
    Clean {
        /// Folder to delete
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Full chore: download, fix names, tag, then move to the library
    Playlist {
        /// Playlist or video URL
        #[arg(short, long)]
        url: String,

        /// Maximum number of items to download
        #[arg(short, long)]
        max_items: Option<u32>,

        /// Library folder the finished files are moved to
        #[arg(short, long)]
        target: PathBuf,
    },
}
