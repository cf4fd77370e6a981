use async_trait::async_trait;
use tokio::fs;
use tracing::info;

use crate::batch::{BatchItem, ItemOperation};
use crate::config::{MediaConfig, PhotoConfig};
use crate::error::{Result, SojiError};
use crate::process::ExternalCommand;

/// Converts one HEIC photo to PNG through ffmpeg. The source file is
/// deleted only after the PNG has been confirmed on disk.
pub struct HeicConverter {
    ffmpeg_path: String,
    hwaccel: Option<String>,
}

impl HeicConverter {
    pub fn new(media: &MediaConfig, photo: &PhotoConfig) -> Self {
        Self {
            ffmpeg_path: media.ffmpeg_path.clone(),
            hwaccel: photo.hwaccel.clone(),
        }
    }

    fn build_command(&self, item: &BatchItem) -> ExternalCommand {
        let png = item.path.with_extension("png");
        let mut cmd = ExternalCommand::new(&self.ffmpeg_path, "HEIC conversion");
        if let Some(hwaccel) = &self.hwaccel {
            cmd = cmd.arg("-hwaccel").arg(hwaccel);
        }
        cmd.arg("-i")
            .path_arg(&item.path)
            .arg("-vf")
            .arg("scale=-2:-2")
            .path_arg(&png)
            .arg("-y")
    }
}

#[async_trait]
impl ItemOperation for HeicConverter {
    async fn apply(&self, item: &BatchItem) -> Result<()> {
        let png = item.path.with_extension("png");
        let output = self.build_command(item).execute().await?;

        let converted = output.status.success() && fs::try_exists(&png).await.unwrap_or(false);
        if !converted {
            return Err(SojiError::Process(format!(
                "ffmpeg failed with {}",
                output.status
            )));
        }

        fs::remove_file(&item.path).await?;
        info!(
            "Converted {} -> {}",
            item.path.display(),
            png.display()
        );
        Ok(())
    }
}
