//! State snapshots for checkpointable objects

use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Contract for objects whose state can be checkpointed to a single file
///
/// `save` must leave either the complete state file or nothing; `restore`
/// replaces the object's state with the file's contents.
#[async_trait]
pub trait Checkpointable: Send + Sync {
    /// Write this object's state to `path`
    async fn save(&self, path: &Path) -> Result<()>;

    /// Replace this object's state with the state stored at `path`
    async fn restore(&mut self, path: &Path) -> Result<()>;
}

/// Generate a unique temporary path next to the target file
fn temp_path(path: &Path) -> PathBuf {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4()
    );
    path.with_file_name(temp_name)
}

/// Atomically write `state` to `path` as JSON
///
/// Writes to a temporary file in the same directory, syncs, then renames.
pub async fn write_state_file<T: Serialize>(path: &Path, state: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(state)?;
    let temp = temp_path(path);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(&temp).await?;
    file.write_all(&data).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp, path).await?;

    debug!(path = %path.display(), size = data.len(), "State file written");
    Ok(())
}

/// Read a JSON state file written by [`write_state_file`]
///
/// A missing file is reported as [`Error::CheckpointFileMissing`] naming the
/// path.
pub async fn read_state_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::CheckpointFileMissing {
                path: path.display().to_string(),
            })
        }
        Err(e) => return Err(Error::Io(e)),
    };
    Ok(serde_json::from_slice(&data)?)
}
