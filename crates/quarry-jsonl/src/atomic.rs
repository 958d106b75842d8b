//! Crash-safe replacement of JSONL files.
//!
//! Values are written to a sibling `.tmp` file which is flushed and then
//! renamed over the target. On POSIX filesystems the rename is atomic, so
//! readers see either the old file or the complete new one.

use crate::{JsonlWriter, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::File;

/// Atomically replaces `path` with `values`, one JSON value per line.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created or written,
/// a value fails to serialize, or the rename fails. The original file is
/// left untouched in every failure case.
pub async fn write_jsonl_atomic<T, P>(path: P, values: &[T]) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    write_jsonl_atomic_iter(path, values.iter()).await
}

/// Iterator form of [`write_jsonl_atomic`].
///
/// # Errors
///
/// See [`write_jsonl_atomic`].
pub async fn write_jsonl_atomic_iter<T, I, P>(path: P, values: I) -> Result<()>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let temp_path = make_temp_path(path);

    if let Err(e) = write_to_temp_file(&temp_path, values).await {
        // Best-effort cleanup; the write error is what the caller needs.
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    tokio::fs::rename(&temp_path, path).await?;
    tracing::trace!(path = %path.display(), "replaced JSONL file");
    Ok(())
}

/// `rows.jsonl` becomes `rows.jsonl.tmp`; `rows` becomes `rows.tmp`.
fn make_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let new_extension = match path.extension() {
        Some(ext) => {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".tmp");
            new_ext
        }
        None => OsString::from("tmp"),
    };
    temp_path.set_extension(new_extension);
    temp_path
}

async fn write_to_temp_file<T, I>(temp_path: &Path, values: I) -> Result<()>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let file = File::create(temp_path).await?;
    let mut writer = JsonlWriter::new(file);
    writer.write_all(values).await?;
    writer.flush().await?;
    tracing::trace!(path = %temp_path.display(), lines = writer.lines_written(), "wrote temp file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::{json, Value};

    #[rstest]
    #[case::with_extension("rows.jsonl", "rows.jsonl.tmp")]
    #[case::without_extension("rows", "rows.tmp")]
    fn temp_path_appends_tmp(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(make_temp_path(Path::new(input)), PathBuf::from(expected));
    }

    #[tokio::test]
    async fn replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.jsonl");
        tokio::fs::write(&path, "stale\n").await.unwrap();

        write_jsonl_atomic(&path, &[json!({"id": 1}), json!({"id": 2})])
            .await
            .unwrap();

        let (values, warnings) = crate::read_jsonl_resilient::<Value, _>(&path).await.unwrap();
        assert_eq!(values.len(), 2);
        assert!(warnings.is_empty());
        assert!(!make_temp_path(&path).exists());
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_partial_target() {
        let dir = tempfile::tempdir().unwrap();
        let missing_parent = dir.path().join("missing").join("tickets.jsonl");

        let result = write_jsonl_atomic(&missing_parent, &[json!({"id": 1})]).await;
        assert!(result.is_err());
        assert!(!missing_parent.exists());
    }
}
