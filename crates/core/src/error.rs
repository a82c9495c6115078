//! Error types shared across the data-loading and checkpoint crates

use thiserror::Error;

/// Result type alias using the granary Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for data sources and checkpointing
#[derive(Error, Debug)]
pub enum Error {
    // Checkpoint errors
    #[error("restore requires an item to restore into")]
    MissingRestoreTarget,

    #[error("checkpoint file {path} does not exist")]
    CheckpointFileMissing { path: String },

    #[error("state was saved for source '{expected}' but the live source is '{actual}'")]
    StateMismatch { expected: String, actual: String },

    #[error("unsupported state version {found} (supported: {supported})")]
    UnsupportedStateVersion { found: u32, supported: u32 },

    // Record file errors
    #[error("record file {path} is corrupted: {reason}")]
    RecordFileCorrupted { path: String, reason: String },

    #[error("record key {key} out of range (source has {num_records} records)")]
    KeyOutOfRange { key: u64, num_records: u64 },

    #[error("invalid path spec '{spec}': {reason}")]
    InvalidPathSpec { spec: String, reason: String },

    // Storage errors
    #[error("storage error: {message}")]
    Storage { message: String },

    // Configuration errors
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if this error indicates data or configuration that cannot
    /// be recovered from by retrying
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::RecordFileCorrupted { .. }
                | Error::InvalidConfig { .. }
                | Error::UnsupportedStateVersion { .. }
                | Error::StateMismatch { .. }
        )
    }

    /// Returns true if this error means a required input was absent
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::CheckpointFileMissing { .. } | Error::KeyOutOfRange { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
