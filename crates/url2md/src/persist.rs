//! Atomic markdown file output
//!
//! Content goes to a temporary file in the target directory which is then
//! renamed over the destination, so readers never observe a partial file.

use crate::error::ConvertError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically replace `target` with `content`
///
/// The parent directory is created if it does not exist.
pub fn write_atomic(target: &Path, content: &str) -> Result<(), ConvertError> {
    let io_err = |source: std::io::Error| ConvertError::Io {
        path: target.to_path_buf(),
        source,
    };

    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if dir.exists() && !dir.is_dir() {
        return Err(io_err(std::io::Error::other(format!(
            "{} is not a directory",
            dir.display()
        ))));
    }
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(content.as_bytes()).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.as_file_mut().sync_all().map_err(io_err)?;
    tmp.persist(target).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// [`write_atomic`] on the blocking thread pool
pub async fn write_atomic_async(target: PathBuf, content: String) -> Result<(), ConvertError> {
    let path = target.clone();
    tokio::task::spawn_blocking(move || write_atomic(&target, &content))
        .await
        .map_err(|e| ConvertError::Io {
            path,
            source: std::io::Error::other(e.to_string()),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_dir_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/out/abc.md");

        write_atomic(&path, "# Hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# Hello");
    }

    #[test]
    fn test_write_replaces_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.md");
        write_atomic(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("a.md")).unwrap(), "new");
        // No temp files left behind
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_into_file_path_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let err = write_atomic(&blocker.join("a.md"), "content").unwrap_err();
        match err {
            ConvertError::Io { path, .. } => assert_eq!(path, blocker.join("a.md")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_async() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("b.md");
        write_atomic_async(path.clone(), "body".to_string())
            .await
            .unwrap();
        assert_eq!(tokio::fs::read_to_string(path).await.unwrap(), "body");
    }
}
