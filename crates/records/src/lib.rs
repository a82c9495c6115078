//! Random-access record-file data sources
//!
//! This crate provides:
//! - **Record files**: a sharded, memory-mappable file format with an index
//!   for random access by position
//! - **Data sources**: many files (or file ranges) exposed as one indexable
//!   key space, with shared-resource deduplication and an optional in-memory
//!   record cache
//! - **Iteration**: sequential or per-epoch shuffled iteration whose
//!   position can be checkpointed and restored exactly
//!
//! # Example
//!
//! ```no_run
//! use granary_records::{IteratorOptions, RecordDataSource, RecordIterator};
//! use std::sync::Arc;
//!
//! # fn example() -> granary_core::Result<()> {
//! let source = RecordDataSource::builder()
//!     .path("/data/train@4")
//!     .cache(true)
//!     .build()?;
//!
//! let options = IteratorOptions {
//!     shuffle_seed: Some(42),
//!     num_epochs: Some(1),
//! };
//! for record in RecordIterator::new(Arc::new(source), options) {
//!     let _record = record?;
//!     // feed the training loop
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod fileset;
mod format;
mod instructions;
mod iterator;
mod source;

pub use cache::RecordCache;
pub use fileset::RecordFileSet;
pub use format::{RecordFileReader, RecordFileWriter, RECORD_FILE_MAGIC, RECORD_FILE_VERSION};
pub use instructions::{resolve_instructions, shard_filename, ReadInstruction};
pub use iterator::{IteratorOptions, IteratorState, RecordIterator, STATE_VERSION};
pub use source::{
    InMemoryDataSource, ParseFn, RandomAccess, RecordDataSource, RecordDataSourceBuilder,
};

// Re-export reader knobs from granary-core for convenience
pub use granary_core::ReaderConfig;
