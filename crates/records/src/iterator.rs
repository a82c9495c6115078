//! Checkpointable iteration over a random-access source
//!
//! A [`RecordIterator`] walks the key space of a source for a configurable
//! number of epochs, either in key order or in a per-epoch deterministic
//! shuffle. Its position is a small serializable state, so iteration can be
//! checkpointed and resumed exactly.

use crate::source::{ParseFn, RandomAccess};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use granary_core::{read_state_file, write_state_file, Checkpointable, Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Version tag written into iterator state files
pub const STATE_VERSION: u32 = 1;

/// Options controlling iteration order and length
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IteratorOptions {
    /// Shuffle keys each epoch with this seed; `None` iterates in key order
    pub shuffle_seed: Option<u64>,

    /// Number of passes over the source; `None` iterates forever
    pub num_epochs: Option<u64>,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        Self {
            shuffle_seed: None,
            num_epochs: Some(1),
        }
    }
}

/// Serializable snapshot of an iterator's position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IteratorState {
    /// State format version
    pub version: u32,

    /// Identifier of the source the state belongs to
    pub source_id: String,

    /// Epoch the iterator is in
    pub epoch: u64,

    /// Index into the epoch's key order of the next record to yield
    pub next_index: u64,

    /// Shuffle seed in effect when the state was taken
    pub shuffle_seed: Option<u64>,

    /// Epoch limit in effect when the state was taken
    pub num_epochs: Option<u64>,

    /// When the snapshot was taken
    pub saved_at: DateTime<Utc>,
}

/// Combine the base seed and epoch into one shuffle seed
fn epoch_seed(seed: u64, epoch: u64) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    epoch.hash(&mut hasher);
    hasher.finish()
}

/// Deterministic key order for one epoch
fn shuffled_order(seed: u64, epoch: u64, num_records: u64) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..num_records).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(epoch_seed(seed, epoch));
    keys.shuffle(&mut rng);
    keys
}

/// Iterator over a random-access source with a checkpointable position
pub struct RecordIterator<S: RandomAccess> {
    source: Arc<S>,
    options: IteratorOptions,
    epoch: u64,
    next_index: u64,
    /// Key order of the current epoch, built lazily when shuffling
    order: Option<Vec<u64>>,
    parse_fn: Option<Arc<ParseFn>>,
}

impl<S: RandomAccess> RecordIterator<S> {
    /// Create an iterator at the start of epoch 0
    ///
    /// Picks up the source's parse function, when it has one.
    pub fn new(source: Arc<S>, options: IteratorOptions) -> Self {
        let parse_fn = source.parse_fn();
        Self {
            source,
            options,
            epoch: 0,
            next_index: 0,
            order: None,
            parse_fn,
        }
    }

    /// Epoch the iterator is currently in
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Index of the next record within the current epoch
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Snapshot the iterator's position
    pub fn state(&self) -> IteratorState {
        IteratorState {
            version: STATE_VERSION,
            source_id: self.source.source_id().to_string(),
            epoch: self.epoch,
            next_index: self.next_index,
            shuffle_seed: self.options.shuffle_seed,
            num_epochs: self.options.num_epochs,
            saved_at: Utc::now(),
        }
    }

    /// Replace the iterator's position with a snapshot
    ///
    /// The snapshot must have been taken against the same source.
    pub fn restore_state(&mut self, state: IteratorState) -> Result<()> {
        if state.version != STATE_VERSION {
            return Err(Error::UnsupportedStateVersion {
                found: state.version,
                supported: STATE_VERSION,
            });
        }
        if state.source_id != self.source.source_id() {
            return Err(Error::StateMismatch {
                expected: state.source_id,
                actual: self.source.source_id().to_string(),
            });
        }
        self.epoch = state.epoch;
        self.next_index = state.next_index;
        self.options.shuffle_seed = state.shuffle_seed;
        self.options.num_epochs = state.num_epochs;
        self.order = None;
        Ok(())
    }
}

impl<S: RandomAccess> Iterator for RecordIterator<S> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        let num_records = self.source.num_records();
        if num_records == 0 {
            return None;
        }

        loop {
            if let Some(limit) = self.options.num_epochs {
                if self.epoch >= limit {
                    return None;
                }
            }
            if self.next_index < num_records {
                break;
            }
            self.epoch += 1;
            self.next_index = 0;
            self.order = None;
        }

        let key = match self.options.shuffle_seed {
            Some(seed) => {
                let epoch = self.epoch;
                let order = self
                    .order
                    .get_or_insert_with(|| shuffled_order(seed, epoch, num_records));
                order[self.next_index as usize]
            }
            None => self.next_index,
        };
        self.next_index += 1;

        let record = match self.source.get(key) {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        match &self.parse_fn {
            Some(parse) => Some(parse(record)),
            None => Some(Ok(record)),
        }
    }
}

#[async_trait]
impl<S: RandomAccess> Checkpointable for RecordIterator<S> {
    async fn save(&self, path: &Path) -> Result<()> {
        let state = self.state();
        write_state_file(path, &state).await?;
        info!(
            path = %path.display(),
            epoch = state.epoch,
            next_index = state.next_index,
            "Iterator state saved"
        );
        Ok(())
    }

    async fn restore(&mut self, path: &Path) -> Result<()> {
        let state: IteratorState = read_state_file(path).await?;
        self.restore_state(state)?;
        info!(
            path = %path.display(),
            epoch = self.epoch,
            next_index = self.next_index,
            "Iterator state restored"
        );
        Ok(())
    }
}

impl<S: RandomAccess> std::fmt::Debug for RecordIterator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordIterator")
            .field("source_id", &self.source.source_id())
            .field("epoch", &self.epoch)
            .field("next_index", &self.next_index)
            .finish()
    }
}
