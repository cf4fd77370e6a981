use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::batch::{BatchItem, ItemOperation};
use crate::config::TagConfig;
use crate::error::{Result, SojiError};
use crate::process::ExternalCommand;

/// The metadata fields written to one audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub track: u32,
}

/// Derive tags from a `Title - Artist` file stem. Stems that do not split
/// into exactly two dash-separated parts are rejected.
pub fn tags_from_stem(stem: &str, track: u32, config: &TagConfig) -> Option<TrackTags> {
    let mut parts = stem.splitn(2, '-');
    let title = parts.next()?.trim();
    let artist = parts.next()?.trim();
    if title.is_empty() || artist.is_empty() {
        return None;
    }

    Some(TrackTags {
        title: title.to_string(),
        artist: artist.to_string(),
        album: config.album.clone(),
        genre: config.genre.clone(),
        track,
    })
}

/// Writes metadata to an audio file. Kept behind a trait so the ffmpeg
/// remux below can be swapped for a native tag library.
#[async_trait]
pub trait TagWriter: Send + Sync {
    async fn write(&self, path: &Path, tags: &TrackTags) -> Result<()>;
}

/// Tag writer that remuxes the file through ffmpeg with `-c copy`, adding
/// `-metadata` entries, then swaps the staging file over the original.
pub struct FfmpegTagWriter {
    ffmpeg_path: String,
}

impl FfmpegTagWriter {
    pub fn new<S: Into<String>>(ffmpeg_path: S) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn build_command(&self, input: &Path, staging: &Path, tags: &TrackTags) -> ExternalCommand {
        ExternalCommand::new(&self.ffmpeg_path, "Tag write")
            .arg("-y")
            .arg("-i")
            .path_arg(input)
            .arg("-map")
            .arg("0")
            .arg("-c")
            .arg("copy")
            .arg("-metadata")
            .arg(format!("title={}", tags.title))
            .arg("-metadata")
            .arg(format!("artist={}", tags.artist))
            .arg("-metadata")
            .arg(format!("album={}", tags.album))
            .arg("-metadata")
            .arg(format!("genre={}", tags.genre))
            .arg("-metadata")
            .arg(format!("track={}", tags.track))
            .path_arg(staging)
    }
}

#[async_trait]
impl TagWriter for FfmpegTagWriter {
    async fn write(&self, path: &Path, tags: &TrackTags) -> Result<()> {
        let staging = path.with_extension("tagged.mp3");
        let command = self.build_command(path, &staging, tags);
        let output = command.execute().await?;

        if !output.status.success() {
            let _ = fs::remove_file(&staging).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SojiError::Process(format!(
                "Tag write failed with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        fs::rename(&staging, path).await?;
        debug!("Tagged {} as {:?}", path.display(), tags);
        Ok(())
    }
}

/// Batch operation tagging one file from its name; the track number is the
/// item's 1-based position in the sorted input.
pub struct TagOperation {
    writer: Arc<dyn TagWriter>,
    config: TagConfig,
}

impl TagOperation {
    pub fn new(writer: Arc<dyn TagWriter>, config: TagConfig) -> Self {
        Self { writer, config }
    }
}

#[async_trait]
impl ItemOperation for TagOperation {
    async fn apply(&self, item: &BatchItem) -> Result<()> {
        let stem = item
            .path
            .file_stem()
            .ok_or_else(|| SojiError::Operation(format!("No file stem: {}", item.path.display())))?
            .to_string_lossy();

        let track = (item.index + 1) as u32;
        let tags = tags_from_stem(&stem, track, &self.config).ok_or_else(|| {
            SojiError::Operation(format!(
                "Invalid file name format (expected 'Title - Artist'): {}",
                item.path.display()
            ))
        })?;

        self.writer.write(&item.path, &tags).await?;
        info!("Tagged: {}", item.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[test]
    fn test_tags_from_stem_splits_title_and_artist() {
        let tags = tags_from_stem("Some Song - Some Artist", 3, &TagConfig::default())
            .expect("valid stem");
        assert_eq!(tags.title, "Some Song");
        assert_eq!(tags.artist, "Some Artist");
        assert_eq!(tags.album, "My Music");
        assert_eq!(tags.track, 3);
    }

    #[test]
    fn test_tags_from_stem_splits_on_first_dash_only() {
        let tags = tags_from_stem("Song - Artist - Extra", 1, &TagConfig::default())
            .expect("valid stem");
        assert_eq!(tags.title, "Song");
        assert_eq!(tags.artist, "Artist - Extra");
    }

    #[test]
    fn test_tags_from_stem_rejects_unsplittable_names() {
        assert!(tags_from_stem("no dash here", 1, &TagConfig::default()).is_none());
        assert!(tags_from_stem("- artist", 1, &TagConfig::default()).is_none());
    }

    struct RecordingWriter {
        written: Mutex<Vec<(PathBuf, TrackTags)>>,
    }

    #[async_trait]
    impl TagWriter for RecordingWriter {
        async fn write(&self, path: &Path, tags: &TrackTags) -> Result<()> {
            self.written
                .lock()
                .expect("lock")
                .push((path.to_path_buf(), tags.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_tag_operation_uses_one_based_track_numbers() {
        let writer = Arc::new(RecordingWriter {
            written: Mutex::new(Vec::new()),
        });
        let operation = TagOperation::new(writer.clone(), TagConfig::default());

        operation
            .apply(&BatchItem {
                path: PathBuf::from("/music/Song - Artist.mp3"),
                index: 2,
            })
            .await
            .expect("tag");

        let written = writer.written.lock().expect("lock");
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].1.track, 3);
        assert_eq!(written[0].1.title, "Song");
    }

    #[tokio::test]
    async fn test_tag_operation_rejects_malformed_names() {
        let writer = Arc::new(RecordingWriter {
            written: Mutex::new(Vec::new()),
        });
        let operation = TagOperation::new(writer.clone(), TagConfig::default());

        let err = operation
            .apply(&BatchItem {
                path: PathBuf::from("/music/nodash.mp3"),
                index: 0,
            })
            .await
            .expect_err("malformed name");
        assert!(matches!(err, SojiError::Operation(_)));
        assert!(writer.written.lock().expect("lock").is_empty());
    }

    #[test]
    fn test_ffmpeg_tag_command_carries_all_metadata() {
        let writer = FfmpegTagWriter::new("ffmpeg");
        let tags = TrackTags {
            title: "Song".to_string(),
            artist: "Artist".to_string(),
            album: "My Music".to_string(),
            genre: "House".to_string(),
            track: 7,
        };
        let cmd = writer.build_command(
            &PathBuf::from("in.mp3"),
            &PathBuf::from("in.tagged.mp3"),
            &tags,
        );
        let args = cmd.args.join(" ");

        assert!(args.contains("-c copy"));
        assert!(args.contains("title=Song"));
        assert!(args.contains("artist=Artist"));
        assert!(args.contains("album=My Music"));
        assert!(args.contains("genre=House"));
        assert!(args.contains("track=7"));
    }
}
