//! Granary - record-file data sources and iterator checkpointing
//!
//! This crate is the aggregate surface over the workspace members; it holds
//! no logic of its own.
//!
//! - [`granary_core`]: errors, process identity, the [`Checkpointable`]
//!   contract
//! - [`granary_records`]: record files, random-access data sources,
//!   checkpointable iteration
//! - [`granary_checkpoint`]: the per-process save/restore/structure handler
//!
//! # Example
//!
//! ```no_run
//! use granary::{
//!     CheckpointHandler, IteratorOptions, ProcessCheckpointHandler, ProcessInfo,
//!     RecordDataSource, RecordIterator,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> granary::Result<()> {
//! let source = RecordDataSource::builder()
//!     .path("/data/train@8")
//!     .cache(true)
//!     .build()?;
//!
//! let options = IteratorOptions {
//!     shuffle_seed: Some(42),
//!     num_epochs: None,
//! };
//! let mut iterator = RecordIterator::new(Arc::new(source), options);
//!
//! let handler = ProcessCheckpointHandler::new(ProcessInfo::from_env()?);
//! handler
//!     .restore(Path::new("/ckpt/step-1000"), Some(&mut iterator))
//!     .await?;
//! // ... train, then periodically:
//! handler.save(Path::new("/ckpt/step-2000"), &iterator).await?;
//! # Ok(())
//! # }
//! ```

pub use granary_core::{
    read_state_file, write_state_file, Checkpointable, Error, ProcessInfo, ReaderConfig, Result,
    PROCESS_COUNT_ENV, PROCESS_INDEX_ENV,
};

pub use granary_records::{
    resolve_instructions, shard_filename, InMemoryDataSource, IteratorOptions, IteratorState,
    ParseFn, RandomAccess, ReadInstruction, RecordCache, RecordDataSource,
    RecordDataSourceBuilder, RecordFileReader, RecordFileSet, RecordFileWriter, RecordIterator,
    RECORD_FILE_MAGIC, RECORD_FILE_VERSION, STATE_VERSION,
};

pub use granary_checkpoint::{checkpoint_filename, CheckpointHandler, ProcessCheckpointHandler};
