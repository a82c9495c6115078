//! Checkpoint handling for stateful data iterators
//!
//! Provides the save/restore/structure handler contract and a per-process
//! implementation that shards checkpoint state one file per process.

pub mod handler;

pub use handler::{checkpoint_filename, CheckpointHandler, ProcessCheckpointHandler};
