//! The abstract persistence layer: a sorted key/value map with atomic batch
//! writes.
//!
//! The chain never talks to a database directly; it builds [`Batch`]es of
//! puts and deletes over the fixed key layout below and hands them to a
//! [`Store`]. `MemoryStore` backs tests, `SledStore` is the durable
//! default.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use thiserror::Error;

/// A storage failure. The chain treats these as fatal: after the first
/// failed write it refuses further mutations until reopened.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store corruption: {0}")]
    Corrupt(&'static str),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> StoreError {
        StoreError::Backend(e.to_string())
    }
}

/// One atomic set of writes.
#[derive(Debug, Default)]
pub struct Batch {
    pub(crate) ops: Vec<BatchOp>,
}

#[derive(Debug)]
pub(crate) enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

impl Batch {
    pub fn new() -> Batch {
        Batch::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A sorted key/value map with atomic batch writes.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn write(&self, batch: Batch) -> Result<(), StoreError>;
}

/// Stores can be shared; the chain takes ownership, so callers that want to
/// keep inspecting the store hand it an `Arc`.
impl<T: Store> Store for std::sync::Arc<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn write(&self, batch: Batch) -> Result<(), StoreError> {
        (**self).write(batch)
    }
}

/// The key layout.
///
/// Logical namespaces are single-byte prefixes; numeric key components are
/// fixed-width big-endian so the map sorts them naturally.
pub mod layout {
    use bch_chain::{block, transparent::OutPoint};

    /// Schema version value stored under [`VERSION`].
    pub const SCHEMA_VERSION: u32 = 5;

    /// `V` - schema version.
    pub const VERSION: &[u8] = b"V";
    /// `O` - chain options.
    pub const OPTIONS: &[u8] = b"O";
    /// `R` - the tip hash.
    pub const TIP: &[u8] = b"R";

    /// `e[hash]` - chain entry.
    pub fn entry(hash: &block::Hash) -> Vec<u8> {
        prefixed(b'e', &hash.0)
    }

    /// `h[hash]` - height by hash.
    pub fn height(hash: &block::Hash) -> Vec<u8> {
        prefixed(b'h', &hash.0)
    }

    /// `H[height]` - main-chain hash by height.
    pub fn main_hash(height: block::Height) -> Vec<u8> {
        prefixed(b'H', &height.0.to_be_bytes())
    }

    /// `n[hash]` - next main-chain hash.
    pub fn next(hash: &block::Hash) -> Vec<u8> {
        prefixed(b'n', &hash.0)
    }

    /// `p[hash]` - branch-tip flag.
    pub fn branch_tip(hash: &block::Hash) -> Vec<u8> {
        prefixed(b'p', &hash.0)
    }

    /// `b[hash]` - raw block bytes.
    pub fn block(hash: &block::Hash) -> Vec<u8> {
        prefixed(b'b', &hash.0)
    }

    /// `c[hash][index]` - utxo entry.
    pub fn utxo(outpoint: &OutPoint) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + 32 + 4);
        key.push(b'c');
        key.extend_from_slice(&outpoint.hash.0);
        key.extend_from_slice(&outpoint.index.to_be_bytes());
        key
    }

    /// `u[hash]` - undo data for a connected block.
    pub fn undo(hash: &block::Hash) -> Vec<u8> {
        prefixed(b'u', &hash.0)
    }

    /// `v[bit][hash]` - version-bits state cache.
    pub fn version_bits(bit: u8, hash: &block::Hash) -> Vec<u8> {
        let mut key = Vec::with_capacity(2 + 32);
        key.push(b'v');
        key.push(bit);
        key.extend_from_slice(&hash.0);
        key
    }

    fn prefixed(prefix: u8, body: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + body.len());
        key.push(prefix);
        key.extend_from_slice(body);
        key
    }
}

/// An in-memory store for tests and throwaway chains.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// A copy of every key with the given prefix, for tests that compare
    /// whole namespaces.
    pub fn snapshot_prefix(&self, prefix: u8) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let map = self.map.read().expect("memory store lock poisoned");
        map.range(vec![prefix]..vec![prefix + 1])
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let map = self
            .map
            .read()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned"))?;
        Ok(map.get(key).cloned())
    }

    fn write(&self, batch: Batch) -> Result<(), StoreError> {
        let mut map = self
            .map
            .write()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned"))?;
        for op in batch.ops {
            match op {
                BatchOp::Put(key, value) => {
                    map.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// A sled-backed store.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open (or create) a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SledStore, StoreError> {
        let db = sled::open(path)?;
        Ok(SledStore { db })
    }

    /// Open a store that lives only as long as the process; used by tests.
    pub fn temporary() -> Result<SledStore, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(SledStore { db })
    }
}

impl Store for SledStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn write(&self, batch: Batch) -> Result<(), StoreError> {
        let mut sled_batch = sled::Batch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put(key, value) => sled_batch.insert(key, value),
                BatchOp::Delete(key) => sled_batch.remove(key),
            }
        }
        self.db.apply_batch(sled_batch)?;
        self.db.flush()?;
        Ok(())
    }
}
