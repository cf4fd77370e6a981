use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::Result;

/// Files with the given extension directly inside `dir`, sorted by name so
/// positional work (track numbering) is deterministic.
pub fn collect_files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Move every file with `extension` from `source` into `target`, creating
/// `target` if needed. Existing files under the same name are overwritten.
pub async fn move_files(source: &Path, target: &Path, extension: &str) -> Result<usize> {
    fs::create_dir_all(target).await?;

    let files = collect_files_with_extension(source, extension);
    let mut moved = 0;
    for path in &files {
        if let Some(name) = path.file_name() {
            let destination = target.join(name);
            match fs::rename(path, &destination).await {
                Ok(()) => moved += 1,
                Err(_) => {
                    // Rename fails across filesystems; fall back to copy.
                    fs::copy(path, &destination).await?;
                    fs::remove_file(path).await?;
                    moved += 1;
                }
            }
        }
    }

    info!(
        "Moved {} .{} files from {} to {}",
        moved,
        extension,
        source.display(),
        target.display()
    );
    Ok(moved)
}

/// Delete a work folder and everything in it. Missing folders are fine.
pub async fn delete_folder(path: &Path) -> Result<()> {
    if fs::try_exists(path).await.unwrap_or(false) {
        fs::remove_dir_all(path).await?;
        info!("Deleted folder {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.mp3", "a.mp3", "c.txt", "d.MP3"] {
            tokio::fs::write(dir.path().join(name), b"x").await.expect("write");
        }
        tokio::fs::create_dir(dir.path().join("nested")).await.expect("mkdir");
        tokio::fs::write(dir.path().join("nested/e.mp3"), b"x")
            .await
            .expect("write");

        let files = collect_files_with_extension(dir.path(), "mp3");
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mp3", "b.mp3", "d.MP3"]);
    }

    #[tokio::test]
    async fn test_move_files_creates_target_and_moves() {
        let source = tempfile::tempdir().expect("tempdir");
        let target_root = tempfile::tempdir().expect("tempdir");
        let target = target_root.path().join("library");

        for name in ["a.mp3", "b.mp3"] {
            tokio::fs::write(source.path().join(name), b"x").await.expect("write");
        }

        let moved = move_files(source.path(), &target, "mp3").await.expect("move");
        assert_eq!(moved, 2);
        assert!(target.join("a.mp3").exists());
        assert!(!source.path().join("a.mp3").exists());
    }

    #[tokio::test]
    async fn test_delete_folder_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let victim = dir.path().join("work");
        tokio::fs::create_dir(&victim).await.expect("mkdir");
        tokio::fs::write(victim.join("x.mp3"), b"x").await.expect("write");

        delete_folder(&victim).await.expect("delete");
        assert!(!victim.exists());
        delete_folder(&victim).await.expect("second delete is a no-op");
    }
}
