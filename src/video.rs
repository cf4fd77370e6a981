use std::path::Path;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{Result, SojiError};
use crate::operation::{Operation, OperationResult};
use crate::parse::LineParser;
use crate::process::ExternalCommand;
use crate::progress::ProgressSnapshot;

/// Compresses MP4 video through ffmpeg. Progress comes from the `time=`
/// markers ffmpeg prints on stderr, scaled against the input's duration as
/// reported by ffprobe.
pub struct VideoCompressor {
    config: MediaConfig,
}

impl VideoCompressor {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Check if ffmpeg is available
    pub async fn check_availability(&self) -> Result<()> {
        let output = ExternalCommand::new(&self.config.ffmpeg_path, "Version check")
            .arg("-version")
            .execute()
            .await?;

        if output.status.success() {
            debug!("ffmpeg is available");
            Ok(())
        } else {
            Err(SojiError::Process("ffmpeg version check failed".to_string()))
        }
    }

    /// Query the total duration of a media file in seconds.
    pub async fn probe_duration(&self, input: &Path) -> Result<f64> {
        let output = ExternalCommand::new(&self.config.ffprobe_path, "Duration probe")
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .path_arg(input)
            .execute()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SojiError::Probe(format!(
                "ffprobe failed for {}: {}",
                input.display(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let seconds: f64 = stdout.trim().parse().map_err(|_| {
            SojiError::Probe(format!(
                "Could not parse duration from ffprobe output: {:?}",
                stdout.trim()
            ))
        })?;

        if seconds <= 0.0 {
            return Err(SojiError::Probe(format!(
                "Non-positive duration for {}",
                input.display()
            )));
        }

        Ok(seconds)
    }

    fn build_command(&self, input: &Path, output: &Path) -> ExternalCommand {
        ExternalCommand::new(&self.config.ffmpeg_path, "Video compression")
            .arg("-i")
            .path_arg(input)
            .arg("-vcodec")
            .arg(&self.config.video_codec)
            .arg("-crf")
            .arg(self.config.crf.to_string())
            .arg("-preset")
            .arg(&self.config.preset)
            .arg("-acodec")
            .arg(&self.config.audio_codec)
            .arg("-b:a")
            .arg(&self.config.audio_bitrate)
            .path_arg(output)
            .arg("-y")
    }

    pub async fn compress(
        &self,
        input: &Path,
        output: &Path,
        operation: &Operation,
        progress: mpsc::Sender<ProgressSnapshot>,
    ) -> Result<OperationResult> {
        if !input.exists() {
            return Err(SojiError::FileNotFound(input.display().to_string()));
        }

        let total_duration = self.probe_duration(input).await?;
        info!(
            "Compressing {} -> {} ({:.1}s of video)",
            input.display(),
            output.display(),
            total_duration
        );

        let command = self.build_command(input, output);
        operation
            .run_process(
                command,
                LineParser::with_total_duration(total_duration),
                None,
                0,
                progress,
            )
            .await
    }
}
