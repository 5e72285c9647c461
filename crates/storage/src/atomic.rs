//! Crash-safe whole-file writes.
//!
//! A reader of the target path observes either the previous file, no file,
//! or the complete new contents, never a prefix.

use crate::error::{StorageError, StorageResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Infix marking temporary siblings created by [`write`].
pub const TEMP_MARKER: &str = ".tmp.";

/// Write `data` to `path` atomically.
///
/// The bytes go to a uniquely named sibling, are flushed with `sync_all`,
/// and the sibling is renamed over `path`. On failure the sibling is removed
/// (best effort) and `path` is left untouched.
#[instrument(skip(data), fields(path = %path.display(), size = data.len()))]
pub async fn write(path: &Path, data: &[u8]) -> StorageResult<()> {
    let temp_path = temp_sibling(path)?;

    let result = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        // Data must be on disk before the rename makes it visible
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&temp_path).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!(
                temp = %temp_path.display(),
                error = %cleanup,
                "Failed to remove temporary file after aborted write"
            );
        }
        return Err(StorageError::Io(e));
    }

    Ok(())
}

/// Whether `name` is a temporary sibling left by [`write`].
pub fn is_temp_name(name: &str) -> bool {
    name.contains(TEMP_MARKER)
}

fn temp_sibling(path: &Path) -> StorageResult<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
    Ok(path.with_file_name(format!(
        "{}{}{}",
        name.to_string_lossy(),
        TEMP_MARKER,
        Uuid::new_v4().simple()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write(&path, b"first").await.unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"first");

        write(&path, b"second").await.unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("a.img"), b"payload").await.unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["a.img".to_string()]);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_target_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("a.img");

        let err = write(&path, b"payload").await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(!fs::try_exists(&path).await.unwrap());
    }

    #[test]
    fn test_temp_names_are_recognised() {
        let sibling = temp_sibling(Path::new("/data/manifest.json")).unwrap();
        let name = sibling.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("manifest.json.tmp."));
        assert!(is_temp_name(&name));
        assert!(!is_temp_name("manifest.json"));
    }

    #[test]
    fn test_temp_sibling_requires_file_name() {
        assert!(matches!(
            temp_sibling(Path::new("/")),
            Err(StorageError::InvalidPath(_))
        ));
    }
}
