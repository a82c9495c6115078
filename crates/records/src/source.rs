//! Random-access data sources
//!
//! [`RecordDataSource`] exposes a set of record files as one indexable,
//! lengthed source. Sources constructed with the same shared name reuse one
//! underlying [`RecordFileSet`]; when no shared name is given it defaults to
//! a content hash of the path list, so identical path lists dedupe
//! automatically.

use crate::fileset::RecordFileSet;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use granary_core::{Error, ReaderConfig, Result};
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Optional per-record parse function applied after a payload is read
pub type ParseFn = dyn Fn(Bytes) -> Result<Bytes> + Send + Sync;

/// A lengthed source supporting random access by integer key
pub trait RandomAccess: Send + Sync {
    /// Stable identifier of this source, used to validate restored iterator
    /// state
    fn source_id(&self) -> &str;

    /// Total number of records
    fn num_records(&self) -> u64;

    /// Read one record
    fn get(&self, key: u64) -> Result<Bytes>;

    /// Read many records, in input order
    fn get_batch(&self, keys: &[u64]) -> Result<Vec<Bytes>> {
        keys.iter().map(|&key| self.get(key)).collect()
    }

    /// Parse function to apply per record, if any
    fn parse_fn(&self) -> Option<Arc<ParseFn>> {
        None
    }
}

/// Process-global registry of shared record resources
static SHARED_RESOURCES: Lazy<DashMap<String, Weak<RecordFileSet>>> = Lazy::new(DashMap::new);

/// Deterministic shared name for a path list
fn derive_shared_name(specs: &[String]) -> String {
    let mut hasher = Sha256::new();
    for spec in specs {
        hasher.update(spec.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Builder for [`RecordDataSource`]
pub struct RecordDataSourceBuilder {
    specs: Vec<String>,
    parse_fn: Option<Arc<ParseFn>>,
    cache: bool,
    populate: bool,
    shared_name: Option<String>,
}

impl RecordDataSourceBuilder {
    fn new() -> Self {
        Self {
            specs: Vec::new(),
            parse_fn: None,
            cache: false,
            populate: false,
            shared_name: None,
        }
    }

    /// Add one path spec (plain file, `file[start:end]` or `prefix@N`)
    pub fn path(mut self, spec: impl Into<String>) -> Self {
        self.specs.push(spec.into());
        self
    }

    /// Add many path specs
    pub fn paths<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specs.extend(specs.into_iter().map(Into::into));
        self
    }

    /// Parse function applied to each record after it is read
    pub fn parse_fn(
        mut self,
        parse_fn: impl Fn(Bytes) -> Result<Bytes> + Send + Sync + 'static,
    ) -> Self {
        self.parse_fn = Some(Arc::new(parse_fn));
        self
    }

    /// Cache records in memory after the first read
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Pre-fault mapped pages when files are opened
    pub fn populate(mut self, populate: bool) -> Self {
        self.populate = populate;
        self
    }

    /// Name under which the underlying resource is shared
    ///
    /// Sources with the same shared name reuse one resource. Defaults to a
    /// content hash of the path list.
    pub fn shared_name(mut self, name: impl Into<String>) -> Self {
        self.shared_name = Some(name.into());
        self
    }

    /// Open the files and register (or reuse) the shared resource
    pub fn build(self) -> Result<RecordDataSource> {
        if self.specs.is_empty() {
            return Err(Error::InvalidConfig {
                message: "a record data source needs at least one path".to_string(),
            });
        }
        let shared_name = self
            .shared_name
            .unwrap_or_else(|| derive_shared_name(&self.specs));
        let config = ReaderConfig {
            cache: self.cache,
            populate: self.populate,
        };

        // The first builder to register a name opens the files; later
        // builders reuse the live resource and their reader knobs are
        // ignored.
        let fileset = match SHARED_RESOURCES.entry(shared_name.clone()) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(existing) => {
                    debug!(shared_name = %shared_name, "Reusing shared record resource");
                    existing
                }
                None => {
                    let created = Arc::new(RecordFileSet::open(&self.specs, config)?);
                    entry.insert(Arc::downgrade(&created));
                    created
                }
            },
            Entry::Vacant(slot) => {
                let created = Arc::new(RecordFileSet::open(&self.specs, config)?);
                slot.insert(Arc::downgrade(&created));
                created
            }
        };

        Ok(RecordDataSource {
            fileset,
            shared_name,
            parse_fn: self.parse_fn,
        })
    }
}

/// Random-access data source over sharded record files
///
/// Cloning is cheap; clones share the same underlying resource.
#[derive(Clone)]
pub struct RecordDataSource {
    fileset: Arc<RecordFileSet>,
    shared_name: String,
    parse_fn: Option<Arc<ParseFn>>,
}

impl RecordDataSource {
    /// Start building a source
    pub fn builder() -> RecordDataSourceBuilder {
        RecordDataSourceBuilder::new()
    }

    /// Open a source over a single path spec with default options
    pub fn open(spec: impl Into<String>) -> Result<Self> {
        Self::builder().path(spec).build()
    }

    /// Total number of records
    pub fn len(&self) -> u64 {
        self.fileset.num_records()
    }

    /// Returns true if the source holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name under which the underlying resource is shared
    pub fn shared_name(&self) -> &str {
        &self.shared_name
    }

    /// Read many records without blocking the async runtime
    ///
    /// Offloads the lookup onto the blocking thread pool; record reads fault
    /// mapped pages and can stall on disk.
    pub async fn get_batch_async(&self, keys: Vec<u64>) -> Result<Vec<Bytes>> {
        let fileset = self.fileset.clone();
        tokio::task::spawn_blocking(move || fileset.get_batch(&keys))
            .await
            .map_err(|e| Error::Storage {
                message: format!("batch read task failed: {}", e),
            })?
    }

    pub(crate) fn resource(&self) -> &Arc<RecordFileSet> {
        &self.fileset
    }
}

impl RandomAccess for RecordDataSource {
    fn source_id(&self) -> &str {
        &self.shared_name
    }

    fn num_records(&self) -> u64 {
        self.fileset.num_records()
    }

    fn get(&self, key: u64) -> Result<Bytes> {
        self.fileset.get(key)
    }

    fn get_batch(&self, keys: &[u64]) -> Result<Vec<Bytes>> {
        self.fileset.get_batch(keys)
    }

    fn parse_fn(&self) -> Option<Arc<ParseFn>> {
        self.parse_fn.clone()
    }
}

impl std::fmt::Debug for RecordDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecordDataSource(shared_name={})", self.shared_name)
    }
}

/// Small in-memory source for tests and toy datasets
pub struct InMemoryDataSource {
    name: String,
    records: Vec<Bytes>,
    parse_fn: Option<Arc<ParseFn>>,
}

impl InMemoryDataSource {
    pub fn new(name: impl Into<String>, records: Vec<Bytes>) -> Self {
        Self {
            name: name.into(),
            records,
            parse_fn: None,
        }
    }

    /// Attach a per-record parse function
    pub fn with_parse_fn(
        mut self,
        parse_fn: impl Fn(Bytes) -> Result<Bytes> + Send + Sync + 'static,
    ) -> Self {
        self.parse_fn = Some(Arc::new(parse_fn));
        self
    }
}

impl RandomAccess for InMemoryDataSource {
    fn source_id(&self) -> &str {
        &self.name
    }

    fn num_records(&self) -> u64 {
        self.records.len() as u64
    }

    fn get(&self, key: u64) -> Result<Bytes> {
        self.records
            .get(key as usize)
            .cloned()
            .ok_or(Error::KeyOutOfRange {
                key,
                num_records: self.records.len() as u64,
            })
    }

    fn parse_fn(&self) -> Option<Arc<ParseFn>> {
        self.parse_fn.clone()
    }
}

impl std::fmt::Debug for InMemoryDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "InMemoryDataSource(name={}, records={})",
            self.name,
            self.records.len()
        )
    }
}
