//! On-disk record-file format
//!
//! A record file is a sequence of opaque payloads with a footer index that
//! supports random access by position:
//!
//! ```text
//! magic (8) | version (u32) | record count (u64) | index offset (u64)
//! payload 0 | payload 1 | ...
//! index: (offset u64, len u32) per record, at index offset
//! ```
//!
//! All integers are little-endian. Readers memory-map the file and resolve a
//! position to a payload slice via the index.

use bytes::Bytes;
use granary_core::{Error, ReaderConfig, Result};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes identifying a record file
pub const RECORD_FILE_MAGIC: [u8; 8] = *b"GRANREC\x01";

/// Record file format version
pub const RECORD_FILE_VERSION: u32 = 1;

const HEADER_LEN: usize = 8 + 4 + 8 + 8;
const INDEX_ENTRY_LEN: usize = 8 + 4;

fn corrupted(path: &Path, reason: impl Into<String>) -> Error {
    Error::RecordFileCorrupted {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Sequential writer for record files
///
/// Payloads are appended in order; `finish` writes the footer index and
/// patches the header. A file that was not finished is not readable.
pub struct RecordFileWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    entries: Vec<(u64, u32)>,
    offset: u64,
}

impl RecordFileWriter {
    /// Create a new record file at `path`, truncating any existing file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&[0u8; HEADER_LEN])?;
        Ok(Self {
            writer,
            path,
            entries: Vec::new(),
            offset: HEADER_LEN as u64,
        })
    }

    /// Append one record payload
    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        let len = u32::try_from(record.len()).map_err(|_| Error::Storage {
            message: format!(
                "record of {} bytes exceeds the 4 GiB record limit",
                record.len()
            ),
        })?;
        self.writer.write_all(record)?;
        self.entries.push((self.offset, len));
        self.offset += u64::from(len);
        Ok(())
    }

    /// Number of records written so far
    pub fn num_records(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Write the index and header, sync, and return the record count
    pub fn finish(mut self) -> Result<u64> {
        let index_offset = self.offset;
        for (offset, len) in &self.entries {
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(&len.to_le_bytes())?;
        }
        self.writer.flush()?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;

        let mut header = [0u8; HEADER_LEN];
        header[..8].copy_from_slice(&RECORD_FILE_MAGIC);
        header[8..12].copy_from_slice(&RECORD_FILE_VERSION.to_le_bytes());
        header[12..20].copy_from_slice(&(self.entries.len() as u64).to_le_bytes());
        header[20..28].copy_from_slice(&index_offset.to_le_bytes());

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        file.sync_all()?;

        debug!(
            path = %self.path.display(),
            records = self.entries.len(),
            "Record file finished"
        );
        Ok(self.entries.len() as u64)
    }
}

/// Memory-mapped random-access reader for one record file
pub struct RecordFileReader {
    mmap: Mmap,
    path: PathBuf,
    num_records: u64,
    index_offset: usize,
}

impl RecordFileReader {
    /// Open and validate a record file
    pub fn open<P: AsRef<Path>>(path: P, config: ReaderConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::Storage {
            message: format!("failed to open record file {}: {}", path.display(), e),
        })?;

        let mut options = MmapOptions::new();
        if config.populate {
            options.populate();
        }
        // Readers never mutate the file once finished.
        let mmap = unsafe { options.map(&file) }.map_err(|e| Error::Storage {
            message: format!("failed to map record file {}: {}", path.display(), e),
        })?;

        if mmap.len() < HEADER_LEN {
            return Err(corrupted(&path, "file shorter than header"));
        }
        if mmap[..8] != RECORD_FILE_MAGIC {
            return Err(corrupted(&path, "bad magic"));
        }
        let version = u32::from_le_bytes(mmap[8..12].try_into().unwrap());
        if version != RECORD_FILE_VERSION {
            return Err(corrupted(&path, format!("unsupported version {}", version)));
        }
        let num_records = u64::from_le_bytes(mmap[12..20].try_into().unwrap());
        let index_offset = u64::from_le_bytes(mmap[20..28].try_into().unwrap());

        let index_offset = usize::try_from(index_offset)
            .map_err(|_| corrupted(&path, "index offset overflows this platform"))?;
        let index_len = (num_records as usize)
            .checked_mul(INDEX_ENTRY_LEN)
            .ok_or_else(|| corrupted(&path, "index length overflow"))?;
        if index_offset < HEADER_LEN
            || index_offset
                .checked_add(index_len)
                .map(|end| end > mmap.len())
                .unwrap_or(true)
        {
            return Err(corrupted(&path, "index out of file bounds"));
        }

        Ok(Self {
            mmap,
            path,
            num_records,
            index_offset,
        })
    }

    /// Number of records in this file
    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Path this reader was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record at `position`
    pub fn get(&self, position: u64) -> Result<Bytes> {
        if position >= self.num_records {
            return Err(Error::KeyOutOfRange {
                key: position,
                num_records: self.num_records,
            });
        }
        let entry = self.index_offset + (position as usize) * INDEX_ENTRY_LEN;
        let offset = u64::from_le_bytes(self.mmap[entry..entry + 8].try_into().unwrap());
        let len = u32::from_le_bytes(self.mmap[entry + 8..entry + 12].try_into().unwrap());

        let offset = offset as usize;
        let end = offset + len as usize;
        if offset < HEADER_LEN || end > self.index_offset {
            return Err(corrupted(&self.path, format!("record {} out of bounds", position)));
        }
        Ok(Bytes::copy_from_slice(&self.mmap[offset..end]))
    }
}

impl std::fmt::Debug for RecordFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordFileReader")
            .field("path", &self.path)
            .field("num_records", &self.num_records)
            .finish()
    }
}
