use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::download::PlaylistDownloader;
use crate::error::{Result, SojiError};
use crate::fsops;
use crate::names::RenameOperation;
use crate::operation::{Operation, OperationResult};
use crate::photo::HeicConverter;
use crate::progress::ProgressSnapshot;
use crate::tags::{FfmpegTagWriter, TagOperation};
use crate::video::VideoCompressor;

const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// Ties the chores together: builds one `Operation` per invocation, renders
/// its progress channel as a terminal bar, and wires Ctrl-C to cancellation.
pub struct Workflow {
    config: Config,
}

/// Per-run scaffolding around one `Operation`.
struct OperationContext {
    operation: Arc<Operation>,
    display: JoinHandle<()>,
    ctrl_c: JoinHandle<()>,
}

impl OperationContext {
    fn start(label: &str) -> (Self, mpsc::Sender<ProgressSnapshot>) {
        let operation = Arc::new(Operation::new());
        let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let display = tokio::spawn(render_progress(rx, label.to_string()));

        let ctrl_c = {
            let cancel = operation.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Cancellation requested");
                    cancel.cancel();
                }
            })
        };

        (
            Self {
                operation,
                display,
                ctrl_c,
            },
            tx,
        )
    }

    /// Wait for the display task to drain the (now closed) channel.
    async fn finish(self) {
        self.ctrl_c.abort();
        let _ = self.display.await;
    }
}

async fn render_progress(mut rx: mpsc::Receiver<ProgressSnapshot>, label: String) {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{msg:>12} [{bar:40}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message(label);

    while let Some(snapshot) = rx.recv().await {
        match snapshot.total {
            Some(total) if total > 0 => {
                bar.set_length(total);
                bar.set_position(snapshot.completed);
            }
            _ => {
                bar.set_length(100);
                bar.set_position((snapshot.fraction * 100.0).round() as u64);
            }
        }
    }
    bar.finish_and_clear();
}

fn empty_result() -> OperationResult {
    OperationResult {
        success: true,
        cancelled: false,
        failures: Vec::new(),
        items: Vec::new(),
        produced_files: Vec::new(),
        elapsed: Duration::ZERO,
    }
}

impl Workflow {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Download a playlist as audio files.
    pub async fn download(
        &self,
        url: &str,
        max_items: Option<u32>,
        output_dir: Option<PathBuf>,
    ) -> Result<OperationResult> {
        let mut download_config = self.config.download.clone();
        if let Some(dir) = output_dir {
            download_config.output_dir = dir;
        }
        let downloader = PlaylistDownloader::new(download_config);

        let (ctx, tx) = OperationContext::start("Downloading");
        let result = downloader
            .download(url, max_items, &ctx.operation, tx)
            .await;
        ctx.finish().await;
        summarize("Download", result)
    }

    /// Compress an MP4 video.
    pub async fn compress(
        &self,
        input: &Path,
        output: Option<PathBuf>,
    ) -> Result<OperationResult> {
        let output = output.unwrap_or_else(|| default_compressed_path(input));
        let compressor = VideoCompressor::new(self.config.media.clone());
        compressor.check_availability().await?;

        let (ctx, tx) = OperationContext::start("Compressing");
        let result = compressor.compress(input, &output, &ctx.operation, tx).await;
        ctx.finish().await;
        summarize("Compression", result)
    }

    /// Convert every HEIC photo in `dir` to PNG.
    pub async fn convert_photos(&self, dir: &Path) -> Result<OperationResult> {
        let files = fsops::collect_files_with_extension(dir, "heic");
        if files.is_empty() {
            info!("No HEIC files found in {}", dir.display());
            return Ok(empty_result());
        }

        let converter = Arc::new(HeicConverter::new(&self.config.media, &self.config.photo));
        let (ctx, tx) = OperationContext::start("Converting");
        let result = ctx
            .operation
            .run_batch(files, converter, self.config.batch.max_parallelism, tx)
            .await;
        ctx.finish().await;
        summarize("Photo conversion", result)
    }

    /// Clean up and rename MP3 file names in `dir`.
    pub async fn fix_names(&self, dir: &Path) -> Result<OperationResult> {
        let files = fsops::collect_files_with_extension(dir, "mp3");
        if files.is_empty() {
            info!("No MP3 files found in {}", dir.display());
            return Ok(empty_result());
        }

        let (ctx, tx) = OperationContext::start("Renaming");
        let result = ctx
            .operation
            .run_batch(
                files,
                Arc::new(RenameOperation),
                self.config.batch.max_parallelism,
                tx,
            )
            .await;
        ctx.finish().await;
        summarize("Rename", result)
    }

    /// Tag every MP3 in `dir`, numbering tracks by sorted position.
    pub async fn tag(&self, dir: &Path) -> Result<OperationResult> {
        let files = fsops::collect_files_with_extension(dir, "mp3");
        if files.is_empty() {
            info!("No MP3 files found in {}", dir.display());
            return Ok(empty_result());
        }

        let writer = Arc::new(FfmpegTagWriter::new(&self.config.media.ffmpeg_path));
        let operation = Arc::new(TagOperation::new(writer, self.config.tags.clone()));

        let (ctx, tx) = OperationContext::start("Tagging");
        let result = ctx
            .operation
            .run_batch(files, operation, self.config.batch.max_parallelism, tx)
            .await;
        ctx.finish().await;
        summarize("Tagging", result)
    }

    /// Move finished MP3 files into the library folder.
    pub async fn move_audio(&self, source: &Path, target: &Path) -> Result<usize> {
        fsops::move_files(source, target, "mp3").await
    }

    /// Delete a work folder.
    pub async fn clean(&self, dir: &Path) -> Result<()> {
        fsops::delete_folder(dir).await
    }

    /// The full playlist chore: download, fix names, tag, move to library.
    pub async fn playlist(
        &self,
        url: &str,
        max_items: Option<u32>,
        target: &Path,
    ) -> Result<()> {
        let work_dir = self.config.download.output_dir.clone();

        let download = self.download(url, max_items, None).await?;
        if download.cancelled {
            return Err(SojiError::Cancelled);
        }
        if !download.success {
            return Err(SojiError::Operation(
                "Download produced no usable files".to_string(),
            ));
        }

        let rename = self.fix_names(&work_dir).await?;
        if rename.cancelled {
            return Err(SojiError::Cancelled);
        }

        let tag = self.tag(&work_dir).await?;
        if tag.cancelled {
            return Err(SojiError::Cancelled);
        }

        let moved = self.move_audio(&work_dir, target).await?;
        info!("Playlist chore finished: {} files in {}", moved, target.display());
        Ok(())
    }
}

fn default_compressed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_compressed.mp4", stem))
}

fn summarize(label: &str, result: Result<OperationResult>) -> Result<OperationResult> {
    match &result {
        Ok(outcome) if outcome.cancelled => {
            warn!("{} cancelled after {:?}", label, outcome.elapsed);
        }
        Ok(outcome) if outcome.success => {
            info!("{} finished in {:?}", label, outcome.elapsed);
        }
        Ok(outcome) => {
            warn!(
                "{} failed after {:?}: {}",
                label,
                outcome.elapsed,
                outcome.failures.join("; ")
            );
        }
        Err(e) => warn!("{} could not run: {}", label, e),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_compressed_path() {
        assert_eq!(
            default_compressed_path(&PathBuf::from("/videos/trip.mp4")),
            PathBuf::from("/videos/trip_compressed.mp4")
        );
    }

    #[tokio::test]
    async fn test_convert_photos_with_empty_folder_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workflow = Workflow::new(Config::default());
        let result = workflow.convert_photos(dir.path()).await.expect("run");
        assert!(result.success);
        assert!(result.items.is_empty());
    }
}
