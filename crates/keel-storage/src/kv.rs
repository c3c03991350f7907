use crate::Result;
use bytes::Bytes;

/// Ordered byte-keyed store underneath the object store.
///
/// Reads see the last committed state. Every write goes through a
/// [`Transaction`] so that read-modify-write sequences are atomic.
pub trait KVStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>>;

    /// Begin a write transaction; writers are serialized until commit or rollback
    fn transaction(&self) -> Result<Box<dyn Transaction>>;
}

/// Write transaction. Dropping it without committing discards its writes.
pub trait Transaction: Send {
    /// Read a key, seeing this transaction's own writes
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&mut self, key: &[u8]) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}
