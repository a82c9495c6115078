//! Shared resource over a set of record files
//!
//! A [`RecordFileSet`] exposes the records of many files (or file ranges) as
//! one contiguous key space. A global key is mapped to the file whose
//! cumulative range contains it and to the record's position inside that
//! file. File readers are opened on first touch, one per file, and reused
//! for the lifetime of the set.

use crate::cache::RecordCache;
use crate::format::RecordFileReader;
use crate::instructions::{resolve_instructions, ReadInstruction};
use bytes::Bytes;
use granary_core::{Error, ReaderConfig, Result};
use once_cell::sync::OnceCell;
use tracing::info;

/// Random-access resource over a list of read instructions
pub struct RecordFileSet {
    instructions: Vec<ReadInstruction>,
    /// `cumulative[i]` is the number of records before instruction `i`;
    /// the final entry is the total record count
    cumulative: Vec<u64>,
    readers: Vec<OnceCell<RecordFileReader>>,
    cache: Option<RecordCache>,
    config: ReaderConfig,
}

impl RecordFileSet {
    /// Resolve `specs` and build the global index
    ///
    /// Files named by range instructions are not opened here; everything
    /// else is opened once to count records.
    pub fn open(specs: &[String], config: ReaderConfig) -> Result<Self> {
        let count_config = ReaderConfig {
            populate: false,
            ..config
        };
        let instructions = resolve_instructions(specs, |path| {
            RecordFileReader::open(path, count_config).map(|reader| reader.num_records())
        })?;

        let mut cumulative = Vec::with_capacity(instructions.len() + 1);
        let mut total = 0u64;
        cumulative.push(0);
        for instruction in &instructions {
            total += instruction.num_records();
            cumulative.push(total);
        }

        let readers = instructions.iter().map(|_| OnceCell::new()).collect();

        info!(
            files = instructions.len(),
            records = total,
            cache = config.cache,
            "Opened record file set"
        );

        Ok(Self {
            instructions,
            cumulative,
            readers,
            cache: config.cache.then(RecordCache::new),
            config,
        })
    }

    /// Total number of records across all instructions
    pub fn num_records(&self) -> u64 {
        *self.cumulative.last().unwrap_or(&0)
    }

    /// Read instructions backing this set
    pub fn instructions(&self) -> &[ReadInstruction] {
        &self.instructions
    }

    /// Map a global key to `(instruction index, position in file)`
    fn locate(&self, key: u64) -> Result<(usize, u64)> {
        let total = self.num_records();
        if key >= total {
            return Err(Error::KeyOutOfRange {
                key,
                num_records: total,
            });
        }
        // First index whose cumulative count exceeds the key, minus one.
        // Zero-record instructions collapse to equal cumulative entries and
        // are skipped.
        let index = self.cumulative.partition_point(|&count| count <= key) - 1;
        let instruction = &self.instructions[index];
        Ok((index, instruction.start + (key - self.cumulative[index])))
    }

    /// Reader for one instruction, opened on first use
    fn reader(&self, index: usize) -> Result<&RecordFileReader> {
        self.readers[index].get_or_try_init(|| {
            let instruction = &self.instructions[index];
            let reader = RecordFileReader::open(&instruction.filename, self.config)?;
            if reader.num_records() < instruction.end {
                return Err(Error::RecordFileCorrupted {
                    path: instruction.filename.display().to_string(),
                    reason: format!(
                        "holds {} records but instructions expect at least {}",
                        reader.num_records(),
                        instruction.end
                    ),
                });
            }
            Ok(reader)
        })
    }

    /// Read one record by global key
    pub fn get(&self, key: u64) -> Result<Bytes> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lookup(key) {
                return Ok(hit);
            }
        }
        let (index, position) = self.locate(key)?;
        let record = self.reader(index)?.get(position)?;
        if let Some(cache) = &self.cache {
            cache.insert(key, record.clone());
        }
        Ok(record)
    }

    /// Read many records by global key, returning them in input order
    ///
    /// Keys are grouped per file and each file is read in position order, so
    /// a batch touches every file at most once.
    pub fn get_batch(&self, keys: &[u64]) -> Result<Vec<Bytes>> {
        let mut records = vec![Bytes::new(); keys.len()];
        let mut reads_per_file: Vec<Vec<(usize, u64)>> = vec![Vec::new(); self.instructions.len()];

        for (slot, &key) in keys.iter().enumerate() {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.lookup(key) {
                    records[slot] = hit;
                    continue;
                }
            }
            let (index, position) = self.locate(key)?;
            reads_per_file[index].push((slot, position));
        }

        for (index, mut reads) in reads_per_file.into_iter().enumerate() {
            if reads.is_empty() {
                continue;
            }
            reads.sort_unstable_by_key(|&(_, position)| position);
            let reader = self.reader(index)?;
            for (slot, position) in reads {
                let record = reader.get(position)?;
                if let Some(cache) = &self.cache {
                    cache.insert(keys[slot], record.clone());
                }
                records[slot] = record;
            }
        }

        Ok(records)
    }

    /// Number of records currently held by the cache, if caching is enabled
    pub fn cached_records(&self) -> Option<usize> {
        self.cache.as_ref().map(RecordCache::len)
    }
}

impl std::fmt::Debug for RecordFileSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let paths: Vec<_> = self
            .instructions
            .iter()
            .map(|i| i.filename.display().to_string())
            .collect();
        write!(f, "RecordFileSet({})", paths.join(","))
    }
}
