// SPDX-License-Identifier: MIT OR Apache-2.0
//! Crash-safe filesystem helpers.
//!
//! Writes go to a uniquely named temporary file in the target directory,
//! are synced, and are renamed over the final path, so a crash leaves either
//! the old content or the new content, never a partial file. Readers only
//! ever see the final name.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{Result, VaultError};

fn temp_path(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().ok_or_else(|| {
        VaultError::IoFailure("target path has no parent directory".to_string())
    })?;
    let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("file");
    Ok(parent.join(format!(".{}.tmp.{}", file_name, Uuid::new_v4())))
}

/// Fsync the parent directory so the rename itself is durable.
#[cfg(unix)]
fn fsync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn io_failure(err: &io::Error) -> VaultError {
    VaultError::IoFailure(err.to_string())
}

/// Atomically replace `path` with `data`.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        VaultError::IoFailure("target path has no parent directory".to_string())
    })?;
    fs::create_dir_all(parent).map_err(|e| io_failure(&e))?;

    let temp = temp_path(path)?;
    let result = (|| {
        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, path)?;
        fsync_dir(parent)
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&temp);
        return Err(io_failure(&err));
    }
    Ok(())
}

/// Read a file, mapping a missing file to the domain [`VaultError::NotFound`].
pub fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            VaultError::NotFound
        } else {
            io_failure(&e)
        }
    })
}

/// Remove a file, mapping a missing file to the domain [`VaultError::NotFound`].
pub fn remove(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            VaultError::NotFound
        } else {
            io_failure(&e)
        }
    })
}

/// Create a directory and all of its parents.
pub fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| io_failure(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");

        atomic_write(&path, b"payload").unwrap();
        assert_eq!(read(&path).unwrap(), b"payload");
    }

    #[test]
    fn test_atomic_write_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("file.bin");

        atomic_write(&path, b"nested").unwrap();
        assert_eq!(read(&path).unwrap(), b"nested");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");

        atomic_write(&path, b"payload").unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let result = read(&dir.path().join("missing"));
        assert!(matches!(result, Err(VaultError::NotFound)));
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let result = remove(&dir.path().join("missing"));
        assert!(matches!(result, Err(VaultError::NotFound)));
    }

    #[test]
    fn test_remove_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");

        atomic_write(&path, b"payload").unwrap();
        remove(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_write_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");

        atomic_write(&path, &[]).unwrap();
        assert!(read(&path).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_writers_one_wins() {
        use std::sync::Arc;
        use std::thread;

        let dir = tempdir().unwrap();
        let path = Arc::new(dir.path().join("shared"));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = Arc::clone(&path);
                thread::spawn(move || {
                    atomic_write(&path, format!("writer_{i}").as_bytes()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = read(&path).unwrap();
        assert!(content.starts_with(b"writer_"));
    }
}
