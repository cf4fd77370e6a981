use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SojiError};

fn default_max_parallelism() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub download: DownloadConfig,
    pub media: MediaConfig,
    pub photo: PhotoConfig,
    pub tags: TagConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Path to the yt-dlp binary
    pub binary_path: String,
    /// Directory downloaded audio files land in
    pub output_dir: PathBuf,
    /// Optional cookies file passed to yt-dlp
    pub cookies_file: Option<PathBuf>,
    /// Directory containing ffmpeg, passed as --ffmpeg-location
    pub ffmpeg_location: Option<PathBuf>,
    /// Audio format for extraction
    pub audio_format: String,
    /// yt-dlp audio quality (0 = best)
    pub audio_quality: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to the ffprobe binary
    pub ffprobe_path: String,
    /// Video codec for compression
    pub video_codec: String,
    /// Constant rate factor (higher = smaller file)
    pub crf: u32,
    /// Encoder preset (ultrafast, fast, medium, slow, veryslow)
    pub preset: String,
    /// Audio codec for compression
    pub audio_codec: String,
    /// Audio bitrate for compression
    pub audio_bitrate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PhotoConfig {
    /// Optional hardware acceleration backend (e.g. "cuda")
    pub hwaccel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagConfig {
    /// Album written to every tagged file
    pub album: String,
    /// Genre written to every tagged file
    pub genre: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of batch items processed concurrently
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            binary_path: "yt-dlp".to_string(),
            output_dir: PathBuf::from("downloads"),
            cookies_file: None,
            ffmpeg_location: None,
            audio_format: "mp3".to_string(),
            audio_quality: "0".to_string(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            crf: 28,
            preset: "slow".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "96k".to_string(),
        }
    }
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            album: "My Music".to_string(),
            genre: "Rock/Metal/House/Bass".to_string(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_parallelism: default_max_parallelism(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SojiError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| SojiError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SojiError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SojiError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).expect("serialize");
        let parsed: Config = toml::from_str(&text).expect("parse");
        assert_eq!(parsed.download.binary_path, "yt-dlp");
        assert_eq!(parsed.media.crf, 28);
        assert_eq!(parsed.batch.max_parallelism, 4);
    }

    #[test]
    fn test_partial_batch_section_uses_default_parallelism() {
        let parsed: BatchConfig = toml::from_str("").expect("parse");
        assert_eq!(parsed.max_parallelism, 4);
    }
}
