//! Process identity and reader configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming this process's index in the job
pub const PROCESS_INDEX_ENV: &str = "GRANARY_PROCESS_INDEX";

/// Environment variable naming the total process count of the job
pub const PROCESS_COUNT_ENV: &str = "GRANARY_PROCESS_COUNT";

/// Identity of this process within a multi-process training job
///
/// Checkpoint files are sharded by process: each process saves and restores
/// only its own state file. A single-process job is `ProcessInfo::single()`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Index of this process, in `[0, count)`
    pub index: u32,

    /// Total number of processes in the job
    pub count: u32,
}

impl Default for ProcessInfo {
    fn default() -> Self {
        Self::single()
    }
}

impl ProcessInfo {
    /// Identity of the only process in a single-process job
    pub fn single() -> Self {
        Self { index: 0, count: 1 }
    }

    /// Create a process identity, validating `index < count`
    pub fn new(index: u32, count: u32) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidConfig {
                message: "process count must be at least 1".to_string(),
            });
        }
        if index >= count {
            return Err(Error::InvalidConfig {
                message: format!("process index {} not below process count {}", index, count),
            });
        }
        Ok(Self { index, count })
    }

    /// Read the process identity from `GRANARY_PROCESS_INDEX` and
    /// `GRANARY_PROCESS_COUNT`, defaulting to a single-process job when
    /// neither is set
    pub fn from_env() -> Result<Self> {
        let index = read_env_u32(PROCESS_INDEX_ENV)?;
        let count = read_env_u32(PROCESS_COUNT_ENV)?;
        match (index, count) {
            (None, None) => Ok(Self::single()),
            (index, count) => Self::new(index.unwrap_or(0), count.unwrap_or(1)),
        }
    }

    /// Returns true for the process that owns job-wide side effects
    pub fn is_primary(&self) -> bool {
        self.index == 0
    }
}

fn read_env_u32(name: &str) -> Result<Option<u32>> {
    match std::env::var(name) {
        Ok(value) => value.parse::<u32>().map(Some).map_err(|_| Error::InvalidConfig {
            message: format!("{} must be an unsigned integer, got '{}'", name, value),
        }),
        Err(_) => Ok(None),
    }
}

/// Knobs for opening record-file readers
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Cache records in memory after the first read
    pub cache: bool,

    /// Pre-fault mapped pages when opening a file
    pub populate: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            cache: false,
            populate: false,
        }
    }
}
