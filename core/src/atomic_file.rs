//! Write-then-rename publication (spec.md §4.B).
//!
//! Rename is atomic on POSIX (`rename(2)`) and on Windows (`MoveFileEx`
//! with replace semantics, which is what `std::fs::rename` uses there
//! too), so a concurrent reader always observes either the prior contents
//! or the complete new contents — never a torn write (testable property 7).

use crate::error::CoreError;
use crate::error::Result;
use rand::Rng;
use std::path::Path;
use std::path::PathBuf;
use tokio::fs;

/// Publish `bytes` as `dir/name`, atomically. Creates `dir` if missing.
/// Cleans up the temporary file on any failure path.
pub async fn publish(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let tmp_name = format!(".tmp-{}-{name}", random_suffix());
    let tmp_path = dir.join(&tmp_name);
    let final_path = dir.join(name);

    let write_result = write_and_flush(&tmp_path, bytes).await;
    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_path, &final_path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    Ok(final_path)
}

async fn write_and_flush(path: &Path, bytes: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    let n: u64 = rng.random();
    format!("{n:016x}")
}

/// Read `path`, distinguishing `NotFound` from other I/O errors.
pub async fn read(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(CoreError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn publish_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        publish(dir.path(), "a.json", b"{\"x\":1}").await.unwrap();
        let bytes = read(&dir.path().join("a.json")).await.unwrap();
        assert_eq!(bytes, b"{\"x\":1}");
    }

    #[tokio::test]
    async fn publish_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        publish(dir.path(), "a.json", b"hi").await.unwrap();
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = vec![];
        while let Some(e) = entries.next_entry().await.unwrap() {
            names.push(e.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["a.json"]);
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = read(&dir.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn publish_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        publish(dir.path(), "a.json", b"first").await.unwrap();
        publish(dir.path(), "a.json", b"second").await.unwrap();
        let bytes = read(&dir.path().join("a.json")).await.unwrap();
        assert_eq!(bytes, b"second");
    }
}
