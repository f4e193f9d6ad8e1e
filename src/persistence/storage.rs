//! File-system primitives for the datafile
//!
//! The datafile is only ever appended to, or replaced whole through a temp
//! file (`<datafile>~`) that is fsynced and renamed over it.
//!
//! # Crash recovery
//!
//! - datafile present: it is authoritative, a leftover temp file is ignored
//! - only the temp file present: a rename was interrupted, finish it
//! - neither present: start from an empty datafile

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::errors::{PersistenceError, PersistenceResult};

/// Path of the temp file used by crash-safe writes
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("~");
    PathBuf::from(name)
}

async fn exists(path: &Path) -> PersistenceResult<bool> {
    fs::try_exists(path)
        .await
        .map_err(|e| PersistenceError::read_failed(path, e))
}

/// Creates the parent directories of the datafile
pub async fn ensure_parent_dir(path: &Path) -> PersistenceResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| PersistenceError::write_failed(parent, e)),
        _ => Ok(()),
    }
}

/// Leaves exactly one authoritative datafile on disk
pub async fn ensure_datafile_integrity(path: &Path) -> PersistenceResult<()> {
    if exists(path).await? {
        return Ok(());
    }

    let temp = temp_path(path);
    if exists(&temp).await? {
        tracing::warn!(path = %path.display(), "recovering datafile from interrupted compaction");
        return fs::rename(&temp, path)
            .await
            .map_err(|e| PersistenceError::write_failed(path, e));
    }

    fs::write(path, b"")
        .await
        .map_err(|e| PersistenceError::write_failed(path, e))
}

/// Reads the whole datafile
pub async fn read_datafile(path: &Path) -> PersistenceResult<String> {
    fs::read_to_string(path)
        .await
        .map_err(|e| PersistenceError::read_failed(path, e))
}

/// Appends bytes to the datafile and fsyncs them
pub async fn append(path: &Path, contents: &str) -> PersistenceResult<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| PersistenceError::write_failed(path, e))?;

    file.write_all(contents.as_bytes())
        .await
        .map_err(|e| PersistenceError::write_failed(path, e))?;

    file.sync_data()
        .await
        .map_err(|e| PersistenceError::write_failed(path, e))
}

/// Replaces the datafile through an fsynced temp file and a rename
pub async fn crash_safe_write(path: &Path, contents: &str) -> PersistenceResult<()> {
    let temp = temp_path(path);

    let mut file = File::create(&temp)
        .await
        .map_err(|e| PersistenceError::write_failed(&temp, e))?;
    file.write_all(contents.as_bytes())
        .await
        .map_err(|e| PersistenceError::write_failed(&temp, e))?;
    file.sync_all()
        .await
        .map_err(|e| PersistenceError::write_failed(&temp, e))?;
    drop(file);

    fs::rename(&temp, path)
        .await
        .map_err(|e| PersistenceError::write_failed(path, e))?;

    sync_parent_dir(path).await;
    Ok(())
}

// Directory fsync is not available on every platform; a failure here does not
// undo the rename.
async fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Ok(dir) = File::open(parent).await {
        if let Err(e) = dir.sync_all().await {
            tracing::debug!(dir = %parent.display(), error = %e, "directory fsync skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_integrity_creates_empty_datafile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("db.ndjson");
        ensure_parent_dir(&path).await.unwrap();
        ensure_datafile_integrity(&path).await.unwrap();
        assert_eq!(read_datafile(&path).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_integrity_promotes_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.ndjson");
        fs::write(temp_path(&path), "{\"_id\":\"a\"}\n").await.unwrap();

        ensure_datafile_integrity(&path).await.unwrap();
        assert_eq!(read_datafile(&path).await.unwrap(), "{\"_id\":\"a\"}\n");
        assert!(!exists(&temp_path(&path)).await.unwrap());
    }

    #[tokio::test]
    async fn test_integrity_prefers_datafile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.ndjson");
        fs::write(&path, "main\n").await.unwrap();
        fs::write(temp_path(&path), "temp\n").await.unwrap();

        ensure_datafile_integrity(&path).await.unwrap();
        assert_eq!(read_datafile(&path).await.unwrap(), "main\n");
    }

    #[tokio::test]
    async fn test_append_and_crash_safe_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.ndjson");
        append(&path, "one\n").await.unwrap();
        append(&path, "two\n").await.unwrap();
        assert_eq!(read_datafile(&path).await.unwrap(), "one\ntwo\n");

        crash_safe_write(&path, "fresh\n").await.unwrap();
        assert_eq!(read_datafile(&path).await.unwrap(), "fresh\n");
        assert!(!exists(&temp_path(&path)).await.unwrap());
    }
}
