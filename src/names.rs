use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::fs;
use tracing::{info, warn};

use crate::batch::{BatchItem, ItemOperation};
use crate::error::{Result, SojiError};

/// Noise that video platforms append to titles, removed case-insensitively.
static UNWANTED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\(\s*Official\s+Music\s+Video\s*\)",
        r"(?i)\(\s*Official\s+Lyric\s+Video\s*\)",
        r"(?i)\[COPYRIGHT\s+FREE\s+Music\]",
        r"(?i)\(\s*Lyric\s+Video\s*\)",
        r"(?i)\(\s*Official\s+Video\s*\)",
        r"(?i)\(\s*Official\s+Audio\s*\)",
        r"(?i)\[\s*Official\s+Visualizer\s*\]",
        r"(?i)\(\s*Official\s+Visualizer\s*\)",
        r"(?i)\(\s*Visualizer\s*\)",
        r"(?i)\(\s*Audio\s*\)",
        r"(?i)\(\s*HD\s*\)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static LEADING_TRACK_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[\s_\-.]+").expect("valid regex"));

static MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Remove noise patterns and collapse repeated whitespace.
pub fn clean_name(name: &str) -> String {
    let mut name = name.to_string();
    for pattern in UNWANTED_PATTERNS.iter() {
        name = pattern.replace_all(&name, "").trim().to_string();
    }
    let name = MULTI_SPACE.replace_all(&name, " ");
    name.trim_matches(|c| c == ' ' || c == '-').to_string()
}

/// Lowercase the input and capitalize the first letter of each word.
pub fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip a leading track number such as `01 - ` or `2_`.
pub fn strip_track_number(name: &str) -> String {
    LEADING_TRACK_NUMBER.replace(name, "").to_string()
}

/// Produce the final stem for a downloaded file: noise removed, words
/// capitalized, and `Artist - Song` rearranged to `Song - Artist`. Names
/// without exactly one dash keep their full text as the title with an
/// "Unknown Artist" credit.
pub fn format_stem(stem: &str) -> String {
    let cleaned = clean_name(&strip_track_number(stem));

    let parts: Vec<&str> = cleaned.split('-').collect();
    let (title, artist) = if parts.len() == 2 {
        (parts[1].trim(), parts[0].trim())
    } else {
        (cleaned.trim(), "Unknown Artist")
    };

    format!("{} - {}", title_case(title), title_case(artist))
}

/// Batch operation that renames one MP3 to its formatted name. An existing
/// file under the target name makes the rename a logged no-op, not a
/// failure.
pub struct RenameOperation;

#[async_trait]
impl ItemOperation for RenameOperation {
    async fn apply(&self, item: &BatchItem) -> Result<()> {
        let stem = item
            .path
            .file_stem()
            .ok_or_else(|| SojiError::Operation(format!("No file stem: {}", item.path.display())))?
            .to_string_lossy();
        let extension = item
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp3".to_string());

        let new_name = format!("{}.{}", format_stem(&stem), extension);
        let new_path = match item.path.parent() {
            Some(parent) => parent.join(&new_name),
            None => return Err(SojiError::Operation(format!(
                "No parent directory: {}",
                item.path.display()
            ))),
        };

        if new_path == item.path {
            return Ok(());
        }

        if fs::try_exists(&new_path).await.unwrap_or(false) {
            warn!(
                "Skipping rename of '{}': '{}' already exists",
                item.path.display(),
                new_name
            );
            return Ok(());
        }

        fs::rename(&item.path, &new_path).await?;
        info!("Renamed '{}' -> '{}'", item.path.display(), new_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::batch::FileBatchProcessor;
    use crate::process::CancelToken;

    #[test]
    fn test_clean_name_removes_noise_patterns() {
        assert_eq!(
            clean_name("Artist - Song (Official Music Video)"),
            "Artist - Song"
        );
        assert_eq!(clean_name("Artist - Song (official video)"), "Artist - Song");
        assert_eq!(
            clean_name("Track [COPYRIGHT FREE Music] (Audio)"),
            "Track"
        );
    }

    #[test]
    fn test_clean_name_collapses_whitespace() {
        assert_eq!(clean_name("Artist   -  Song   (HD)"), "Artist - Song");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("hello WORLD of rust"), "Hello World Of Rust");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_strip_track_number() {
        assert_eq!(strip_track_number("01 - Song"), "Song");
        assert_eq!(strip_track_number("2_Song"), "Song");
        assert_eq!(strip_track_number("Song 2"), "Song 2");
    }

    #[test]
    fn test_format_stem_rearranges_artist_and_title() {
        assert_eq!(
            format_stem("some artist - some song (Official Video)"),
            "Some Song - Some Artist"
        );
    }

    #[test]
    fn test_format_stem_without_dash_uses_unknown_artist() {
        assert_eq!(format_stem("lone title"), "Lone Title - Unknown Artist");
    }

    #[test]
    fn test_format_stem_with_leading_track_number() {
        assert_eq!(
            format_stem("03 - artist name - song name"),
            "Song Name - Artist Name"
        );
    }

    #[tokio::test]
    async fn test_rename_operation_renames_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let original = dir.path().join("artist - song (Official Video).mp3");
        tokio::fs::write(&original, b"mp3").await.expect("write");

        RenameOperation
            .apply(&BatchItem {
                path: original.clone(),
                index: 0,
            })
            .await
            .expect("rename");

        assert!(!original.exists());
        assert!(dir.path().join("Song - Artist.mp3").exists());
    }

    #[tokio::test]
    async fn test_rename_operation_skips_when_target_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let original = dir.path().join("artist - song.mp3");
        let taken = dir.path().join("Song - Artist.mp3");
        tokio::fs::write(&original, b"new").await.expect("write");
        tokio::fs::write(&taken, b"old").await.expect("write");

        RenameOperation
            .apply(&BatchItem {
                path: original.clone(),
                index: 0,
            })
            .await
            .expect("skip is not a failure");

        assert!(original.exists());
        let kept = tokio::fs::read(&taken).await.expect("read");
        assert_eq!(kept, b"old");
    }

    #[tokio::test]
    async fn test_rename_batch_over_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["a - one.mp3", "b - two.mp3", "c - three.mp3"] {
            tokio::fs::write(dir.path().join(name), b"x").await.expect("write");
        }
        let paths: Vec<PathBuf> = ["a - one.mp3", "b - two.mp3", "c - three.mp3"]
            .iter()
            .map(|n| dir.path().join(n))
            .collect();

        let (tx, _rx) = mpsc::channel(16);
        let results = FileBatchProcessor::new(2)
            .run(paths, Arc::new(RenameOperation), tx, CancelToken::new())
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_success()));
        assert!(dir.path().join("One - A.mp3").exists());
        assert!(dir.path().join("Two - B.mp3").exists());
        assert!(dir.path().join("Three - C.mp3").exists());
    }
}
