use std::path::Path;

use tokio::fs;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::DownloadConfig;
use crate::error::Result;
use crate::operation::{Operation, OperationResult};
use crate::parse::LineParser;
use crate::process::ExternalCommand;
use crate::progress::ProgressSnapshot;

/// Drives yt-dlp to pull a playlist down as audio files. Per-file completion
/// is read from the explicit `Destination:` lines in the tool's output, so
/// progress never depends on watching the output directory.
pub struct PlaylistDownloader {
    config: DownloadConfig,
}

impl PlaylistDownloader {
    pub fn new(config: DownloadConfig) -> Self {
        Self { config }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    fn build_command(&self, url: &str, max_items: Option<u32>) -> ExternalCommand {
        let template = self
            .config
            .output_dir
            .join("%(title).200s.%(ext)s")
            .to_string_lossy()
            .to_string();

        let mut cmd = ExternalCommand::new(&self.config.binary_path, "Playlist download")
            .arg("-f")
            .arg("bestaudio")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg(&self.config.audio_format)
            .arg("--audio-quality")
            .arg(&self.config.audio_quality)
            .arg("--newline");

        if let Some(cookies) = &self.config.cookies_file {
            cmd = cmd.arg("--cookies").path_arg(cookies);
        }
        if let Some(location) = &self.config.ffmpeg_location {
            cmd = cmd.arg("--ffmpeg-location").path_arg(location);
        }

        cmd = cmd.arg("--output").arg(template);

        if let Some(max) = max_items {
            cmd = cmd.arg("--max-downloads").arg(max.to_string());
        }

        cmd.arg(url)
    }

    /// Download up to `max_items` entries. Success requires a clean exit and
    /// at least one produced file.
    pub async fn download(
        &self,
        url: &str,
        max_items: Option<u32>,
        operation: &Operation,
        progress: mpsc::Sender<ProgressSnapshot>,
    ) -> Result<OperationResult> {
        info!(
            "Starting download of up to {} items from {}",
            max_items.map_or_else(|| "all".to_string(), |n| n.to_string()),
            url
        );

        fs::create_dir_all(&self.config.output_dir).await?;

        let command = self.build_command(url, max_items);
        operation
            .run_process(
                command,
                LineParser::new(),
                max_items.map(u64::from),
                1,
                progress,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn downloader() -> PlaylistDownloader {
        PlaylistDownloader::new(DownloadConfig {
            binary_path: "yt-dlp".to_string(),
            output_dir: PathBuf::from("/music/work"),
            cookies_file: Some(PathBuf::from("/music/cookies.txt")),
            ffmpeg_location: Some(PathBuf::from("/opt/ffmpeg/bin")),
            audio_format: "mp3".to_string(),
            audio_quality: "0".to_string(),
        })
    }

    #[test]
    fn test_command_includes_audio_extraction_options() {
        let cmd = downloader().build_command("https://example.com/list", Some(25));
        let args = cmd.args.join(" ");

        assert_eq!(cmd.program, "yt-dlp");
        assert!(args.contains("-f bestaudio"));
        assert!(args.contains("--extract-audio"));
        assert!(args.contains("--audio-format mp3"));
        assert!(args.contains("--audio-quality 0"));
        assert!(args.contains("--cookies /music/cookies.txt"));
        assert!(args.contains("--ffmpeg-location /opt/ffmpeg/bin"));
        assert!(args.contains("--max-downloads 25"));
        assert!(args.contains("%(title).200s.%(ext)s"));
        assert!(args.ends_with("https://example.com/list"));
    }

    #[test]
    fn test_max_downloads_omitted_when_uncapped() {
        let cmd = downloader().build_command("https://example.com/list", None);
        assert!(!cmd.args.iter().any(|a| a == "--max-downloads"));
    }
}
