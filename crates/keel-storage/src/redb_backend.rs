use crate::{KVStore, Result, StorageError, Transaction};
use bytes::Bytes;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use std::path::Path;
use tracing::{debug, info};

const OBJECTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("objects");

/// [`KVStore`] over a single redb table
pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Open the database at `path`, creating it if needed
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening keel store at {}", path.display());

        let db = Database::create(path)?;
        // Create the table up front so readers never see it missing
        let init = db.begin_write()?;
        init.open_table(OBJECTS)?;
        init.commit()?;

        Ok(Self { db })
    }
}

impl KVStore for RedbBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let read = self.db.begin_read()?;
        let table = read.open_table(OBJECTS)?;
        Ok(table.get(key)?.map(|v| Bytes::copy_from_slice(v.value())))
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        let read = self.db.begin_read()?;
        let table = read.open_table(OBJECTS)?;

        let mut entries = Vec::new();
        for entry in table.range(prefix..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix) {
                break;
            }
            entries.push((
                Bytes::copy_from_slice(key.value()),
                Bytes::copy_from_slice(value.value()),
            ));
        }
        debug!(
            "Scanned {} entries under {}",
            entries.len(),
            String::from_utf8_lossy(prefix)
        );
        Ok(entries)
    }

    fn transaction(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(RedbTransaction(Some(self.db.begin_write()?))))
    }
}

/// Holds the redb write transaction until it is committed or rolled back
struct RedbTransaction(Option<WriteTransaction>);

impl RedbTransaction {
    fn inner(&self) -> Result<&WriteTransaction> {
        self.0.as_ref().ok_or_else(finished)
    }

    fn take(&mut self) -> Result<WriteTransaction> {
        self.0.take().ok_or_else(finished)
    }
}

fn finished() -> StorageError {
    StorageError::transaction_error("Transaction already committed or rolled back")
}

impl Transaction for RedbTransaction {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let table = self.inner()?.open_table(OBJECTS)?;
        let value = table.get(key)?.map(|v| Bytes::copy_from_slice(v.value()));
        Ok(value)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner()?.open_table(OBJECTS)?.insert(key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.inner()?.open_table(OBJECTS)?.remove(key)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.take()?.commit()?;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.take()?.abort()?;
        Ok(())
    }
}

impl Drop for RedbTransaction {
    fn drop(&mut self) {
        if let Some(txn) = self.0.take() {
            let _ = txn.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(backend: &RedbBackend, entries: &[(&[u8], &[u8])]) {
        let mut txn = backend.transaction().unwrap();
        for (key, value) in entries {
            txn.put(key, value).unwrap();
        }
        txn.commit().unwrap();
    }

    #[test]
    fn test_committed_writes_are_visible() {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::new(dir.path().join("test.redb")).unwrap();

        write(&backend, &[(b"a", b"1")]);
        assert_eq!(backend.get(b"a").unwrap(), Some(Bytes::from("1")));

        let mut txn = backend.transaction().unwrap();
        txn.delete(b"a").unwrap();
        assert_eq!(txn.get(b"a").unwrap(), None);
        txn.commit().unwrap();
        assert_eq!(backend.get(b"a").unwrap(), None);
    }

    #[test]
    fn test_scan_is_prefix_bounded_and_ordered() {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::new(dir.path().join("test.redb")).unwrap();
        write(
            &backend,
            &[
                (b"clusters/b", b"2"),
                (b"clusters/a", b"1"),
                (b"clustert/c", b"3"),
                (b"machines/d", b"4"),
            ],
        );

        let keys: Vec<_> = backend
            .scan(b"clusters/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![Bytes::from("clusters/a"), Bytes::from("clusters/b")]);
    }

    #[test]
    fn test_uncommitted_writes_are_discarded() {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::new(dir.path().join("test.redb")).unwrap();

        let mut txn = backend.transaction().unwrap();
        txn.put(b"rolled-back", b"1").unwrap();
        assert_eq!(txn.get(b"rolled-back").unwrap(), Some(Bytes::from("1")));
        txn.rollback().unwrap();

        {
            let mut txn = backend.transaction().unwrap();
            txn.put(b"dropped", b"2").unwrap();
        }

        assert_eq!(backend.get(b"rolled-back").unwrap(), None);
        assert_eq!(backend.get(b"dropped").unwrap(), None);
    }
}
