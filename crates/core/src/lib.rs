//! Granary Core - Foundation for the data-loading and checkpoint crates
//!
//! Provides shared error handling, process identity, and the state-snapshot
//! contract used by the record-source and checkpoint crates.

pub mod config;
pub mod error;
pub mod state;

pub use config::{ProcessInfo, ReaderConfig, PROCESS_COUNT_ENV, PROCESS_INDEX_ENV};
pub use error::{Error, Result};
pub use state::{read_state_file, write_state_file, Checkpointable};
