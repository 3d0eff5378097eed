use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use super::RepoError;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RepoError + '_ {
    move |source| RepoError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Writes to a uniquely named sibling, syncs it, then renames it over `path`.
/// A crash at any point leaves either the old content or the new content.
pub async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), RepoError> {
    let temporary_path = get_temporary_path(path);

    let mut file = tokio::fs::File::create(&temporary_path)
        .await
        .map_err(io_error(&temporary_path))?;
    file.write_all(contents).await.map_err(io_error(&temporary_path))?;
    file.sync_all().await.map_err(io_error(&temporary_path))?;
    drop(file);

    if let Err(error) = tokio::fs::rename(&temporary_path, path).await {
        let _ = tokio::fs::remove_file(&temporary_path).await;

        return Err(io_error(path)(error));
    }

    Ok(())
}

pub fn get_temporary_path(path: &Path) -> PathBuf {
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

    path.with_file_name(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()))
}

/// Copies an unreadable file aside with a timestamp suffix
pub async fn quarantine(path: &Path) -> Result<PathBuf, RepoError> {
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let suffix = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let quarantined_path = path.with_file_name(format!("{file_name}.corrupt-{suffix}"));

    tokio::fs::copy(path, &quarantined_path).await.map_err(io_error(path))?;

    Ok(quarantined_path)
}

/// `Ok(None)` when the file does not exist yet
pub async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, std::io::Error> {
    match tokio::fs::read(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

pub async fn ensure_dir(path: &Path) -> Result<(), RepoError> {
    tokio::fs::create_dir_all(path).await.map_err(io_error(path))
}
