//! Backing store adapter.
//!
//! A thin typed façade over redb exposing exactly what the engine needs:
//! point reads and writes, atomic multi-table batches, prefix iteration in
//! key order, and owned snapshot handles. Two tables stand in for the two
//! column families: `tokens` (prefix-partitioned 32-byte keys) and `assets`
//! (symbol-prefixed 37-byte keys).
//!
//! "Not found" is never an error at this layer; every other failure is
//! surfaced to the engine as unrecoverable.

use std::fmt;
use std::path::Path;

use redb::{Database, Durability, ReadTransaction, TableDefinition, WriteTransaction};
use snafu::{ResultExt, Snafu};

const TOKENS: TableDefinition<'static, &'static [u8], &'static [u8]> =
    TableDefinition::new("tokens");
const ASSETS: TableDefinition<'static, &'static [u8], &'static [u8]> =
    TableDefinition::new("assets");

/// Filename of the adapter database inside the store directory.
pub const STORE_FILENAME: &str = "tokens.redb";

/// Errors surfaced by the backing store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AdapterError {
    /// The database file could not be opened or created.
    #[snafu(display("Failed to open backing store: {source}"))]
    Open {
        /// The underlying redb error.
        source: redb::DatabaseError,
    },

    /// A transaction could not be started.
    #[snafu(display("Transaction error: {source}"))]
    Transaction {
        /// The underlying redb error.
        source: redb::TransactionError,
    },

    /// A table could not be opened.
    #[snafu(display("Table error: {source}"))]
    Table {
        /// The underlying redb error.
        source: redb::TableError,
    },

    /// A read or write inside a transaction failed.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// The underlying redb error.
        source: redb::StorageError,
    },

    /// A commit failed.
    #[snafu(display("Commit error: {source}"))]
    Commit {
        /// The underlying redb error.
        source: redb::CommitError,
    },
}

/// Result type alias for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Key-space selector, the engine's stand-in for a column family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Prefix-partitioned token keys.
    Tokens,
    /// Symbol-prefixed balance keys.
    Assets,
}

impl Family {
    fn definition(self) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
        match self {
            Family::Tokens => TOKENS,
            Family::Assets => ASSETS,
        }
    }

    /// Returns the table name for this family.
    pub const fn name(self) -> &'static str {
        match self {
            Family::Tokens => "tokens",
            Family::Assets => "assets",
        }
    }
}

/// Storage profile selected at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// File-backed store with a configured cache size.
    Disk,
    /// Fully in-memory store; nothing survives the process.
    Memory,
}

/// A single staged operation inside a write batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Write `key` to `value`.
    Put {
        /// Target key space.
        family: Family,
        /// Encoded key.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Remove `key` if present.
    Delete {
        /// Target key space.
        family: Family,
        /// Encoded key.
        key: Vec<u8>,
    },
}

/// Typed façade over the embedded ordered store.
///
/// Thread-safe for concurrent reads; mutations follow the engine's
/// single-writer discipline.
pub struct StoreAdapter {
    db: Database,
}

impl StoreAdapter {
    /// Opens (or creates) the store under `dir` with the given profile.
    ///
    /// Both tables are initialized up front so that every snapshot taken
    /// later observes them.
    pub fn open(dir: &Path, cache_size_mib: u64, profile: Profile) -> AdapterResult<Self> {
        let db = match profile {
            Profile::Disk => Database::builder()
                .set_cache_size(cache_size_mib as usize * 1024 * 1024)
                .create(dir.join(STORE_FILENAME))
                .context(OpenSnafu)?,
            Profile::Memory => Database::builder()
                .create_with_backend(redb::backends::InMemoryBackend::new())
                .context(OpenSnafu)?,
        };
        let adapter = StoreAdapter { db };
        adapter.init_tables()?;
        Ok(adapter)
    }

    fn init_tables(&self) -> AdapterResult<()> {
        let txn = self.db.begin_write().context(TransactionSnafu)?;
        {
            txn.open_table(TOKENS).context(TableSnafu)?;
            txn.open_table(ASSETS).context(TableSnafu)?;
        }
        txn.commit().context(CommitSnafu)
    }

    fn begin_write(&self, sync: bool) -> AdapterResult<WriteTransaction> {
        let mut txn = self.db.begin_write().context(TransactionSnafu)?;
        txn.set_durability(if sync { Durability::Immediate } else { Durability::Eventual });
        Ok(txn)
    }

    /// Writes a single key.
    pub fn put(&self, family: Family, key: &[u8], value: &[u8]) -> AdapterResult<()> {
        let txn = self.begin_write(false)?;
        {
            let mut table = txn.open_table(family.definition()).context(TableSnafu)?;
            table.insert(key, value).context(StorageSnafu)?;
        }
        txn.commit().context(CommitSnafu)
    }

    /// Removes a single key; absent keys are not an error.
    pub fn delete(&self, family: Family, key: &[u8]) -> AdapterResult<()> {
        let txn = self.begin_write(false)?;
        {
            let mut table = txn.open_table(family.definition()).context(TableSnafu)?;
            table.remove(key).context(StorageSnafu)?;
        }
        txn.commit().context(CommitSnafu)
    }

    /// Reads a single key, `None` if absent.
    pub fn get(&self, family: Family, key: &[u8]) -> AdapterResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(family.definition()).context(TableSnafu)?;
        Ok(table.get(key).context(StorageSnafu)?.map(|guard| guard.value().to_vec()))
    }

    /// Applies a batch of operations atomically, across both families.
    ///
    /// With `sync` set, the commit is durable before this returns; a crash
    /// leaves either all of the batch or none of it.
    pub fn write_batch(&self, ops: &[BatchOp], sync: bool) -> AdapterResult<()> {
        let txn = self.begin_write(sync)?;
        {
            let mut tokens = txn.open_table(TOKENS).context(TableSnafu)?;
            let mut assets = txn.open_table(ASSETS).context(TableSnafu)?;
            for op in ops {
                match op {
                    BatchOp::Put { family, key, value } => {
                        let table = match family {
                            Family::Tokens => &mut tokens,
                            Family::Assets => &mut assets,
                        };
                        table.insert(&key[..], &value[..]).context(StorageSnafu)?;
                    }
                    BatchOp::Delete { family, key } => {
                        let table = match family {
                            Family::Tokens => &mut tokens,
                            Family::Assets => &mut assets,
                        };
                        table.remove(&key[..]).context(StorageSnafu)?;
                    }
                }
            }
        }
        txn.commit().context(CommitSnafu)
    }

    /// Iterates entries whose key starts with `prefix`, in key order,
    /// invoking `visitor(key, value)` until it returns `false` or the
    /// prefix range ends.
    pub fn for_each_prefix(
        &self,
        family: Family,
        prefix: &[u8],
        mut visitor: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> AdapterResult<()> {
        let txn = self.db.begin_read().context(TransactionSnafu)?;
        let table = txn.open_table(family.definition()).context(TableSnafu)?;
        for item in table.range(prefix..).context(StorageSnafu)? {
            let (key, value) = item.context(StorageSnafu)?;
            let key_bytes = key.value();
            if !key_bytes.starts_with(prefix) {
                break;
            }
            if !visitor(key_bytes, value.value()) {
                break;
            }
        }
        Ok(())
    }

    /// Acquires an owned point-in-time read view.
    pub fn snapshot(&self) -> AdapterResult<StoreSnapshot> {
        Ok(StoreSnapshot { txn: self.db.begin_read().context(TransactionSnafu)? })
    }

    /// Durability barrier: everything committed before this call is on disk
    /// when it returns.
    pub fn flush(&self) -> AdapterResult<()> {
        let txn = self.begin_write(true)?;
        txn.commit().context(CommitSnafu)
    }
}

impl fmt::Debug for StoreAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreAdapter").finish_non_exhaustive()
    }
}

/// An owned snapshot of the store, fixed at acquisition time.
///
/// The underlying read view is released when this value is dropped; the
/// savepoint stack holds exactly one per runtime savepoint.
pub struct StoreSnapshot {
    txn: ReadTransaction,
}

impl StoreSnapshot {
    /// Reads a key as of the snapshot, `None` if it was absent then.
    pub fn get(&self, family: Family, key: &[u8]) -> AdapterResult<Option<Vec<u8>>> {
        let table = self.txn.open_table(family.definition()).context(TableSnafu)?;
        Ok(table.get(key).context(StorageSnafu)?.map(|guard| guard.value().to_vec()))
    }
}

impl fmt::Debug for StoreSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSnapshot").finish_non_exhaustive()
    }
}
