//! Per-process checkpoint handler
//!
//! Fulfills the three-method handler contract (save, restore, structure)
//! that checkpoint orchestration frameworks expect of a stateful item. Each
//! process of a job owns exactly one state file beneath the checkpoint
//! directory, named by its process index and the job's process count.

use async_trait::async_trait;
use granary_core::{Checkpointable, Error, ProcessInfo, Result};
use serde_json::Value;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::info;

/// Name of the state file owned by one process
pub fn checkpoint_filename(process: ProcessInfo) -> String {
    format!("process_{}-of-{}.json", process.index, process.count)
}

/// The handler contract consumed by checkpoint orchestration
#[async_trait]
pub trait CheckpointHandler: Send + Sync {
    /// The stateful object this handler checkpoints
    type Item;

    /// Persist `item` beneath `directory`
    async fn save(&self, directory: &Path, item: &Self::Item) -> Result<()>;

    /// Restore `item` in place from the checkpoint in `directory`
    async fn restore(&self, directory: &Path, item: Option<&mut Self::Item>) -> Result<()>;

    /// Describe the checkpoint layout beneath `directory`, when supported
    async fn structure(&self, directory: &Path) -> Result<Option<Value>>;
}

/// Checkpoint handler for any [`Checkpointable`] item, sharded by process
///
/// `save` writes the item's state to
/// `directory/process_{index}-of-{count}.json` for this handler's process;
/// `restore` reads the same file back into the item. Other processes' files
/// are never touched.
pub struct ProcessCheckpointHandler<T> {
    process: ProcessInfo,
    _item: PhantomData<fn(T) -> T>,
}

impl<T> ProcessCheckpointHandler<T> {
    /// Handler for a given process identity
    pub fn new(process: ProcessInfo) -> Self {
        Self {
            process,
            _item: PhantomData,
        }
    }

    /// Handler for the process identity in the environment
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ProcessInfo::from_env()?))
    }

    /// Process identity this handler saves and restores for
    pub fn process(&self) -> ProcessInfo {
        self.process
    }

    fn state_path(&self, directory: &Path) -> PathBuf {
        directory.join(checkpoint_filename(self.process))
    }
}

impl<T> Default for ProcessCheckpointHandler<T> {
    fn default() -> Self {
        Self::new(ProcessInfo::single())
    }
}

#[async_trait]
impl<T: Checkpointable> CheckpointHandler for ProcessCheckpointHandler<T> {
    type Item = T;

    async fn save(&self, directory: &Path, item: &T) -> Result<()> {
        tokio::fs::create_dir_all(directory).await?;
        let path = self.state_path(directory);
        item.save(&path).await?;
        info!(
            path = %path.display(),
            process = self.process.index,
            processes = self.process.count,
            "Checkpoint saved"
        );
        Ok(())
    }

    async fn restore(&self, directory: &Path, item: Option<&mut T>) -> Result<()> {
        let item = item.ok_or(Error::MissingRestoreTarget)?;
        let path = self.state_path(directory);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::CheckpointFileMissing {
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(Error::Io(e)),
        }
        item.restore(&path).await?;
        info!(
            path = %path.display(),
            process = self.process.index,
            processes = self.process.count,
            "Checkpoint restored"
        );
        Ok(())
    }

    // Required by the handler contract but not supported for per-process
    // state files.
    async fn structure(&self, _directory: &Path) -> Result<Option<Value>> {
        Ok(None)
    }
}
