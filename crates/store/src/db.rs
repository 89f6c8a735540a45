//! The token database facade.
//!
//! `TokenDatabase` types every mutation as `(token_type, op, domain?, key,
//! value)`, routes it to the right key space, and charges rollback metadata
//! to the current savepoint. Reads are byte-oriented; the typed cache sits
//! on top. The savepoint surface — push, rollback, pop, squash and the
//! scoped [`SavepointSession`] — lives here because rollback needs the
//! adapter, and the observer signals fire from the rollback path.
//!
//! # Single-writer discipline
//!
//! One logical chain thread issues all mutation and savepoint calls.
//! Readers may run concurrently; internal state is lock-protected, but the
//! engine does not arbitrate between concurrent writers.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use parking_lot::{Mutex, RwLock};
use tokenledger_types::{ActionOp, Address, Name128, Symbol, TokenType};
use tracing::{debug, info, warn};

use crate::adapter::{BatchOp, Family, Profile, StoreAdapter, StoreSnapshot};
use crate::error::{DatabaseSnafu, Error, Result};
use crate::keys;
use crate::persist::{self, PersistentGroup, RecordedEntry, SAVEPOINTS_LOG_FILENAME};
use crate::savepoint::{Action, ActionData, Savepoint, SavepointKind, SavepointStack};

/// Token database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Directory holding the store and the checkpoint log. Created if
    /// missing.
    pub db_path: PathBuf,
    /// Adapter cache size in MiB (disk profile).
    pub cache_size_mib: u64,
    /// Disk or memory profile.
    pub profile: Profile,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { db_path: PathBuf::from("tokendb"), cache_size_mib: 256, profile: Profile::Disk }
    }
}

type TokenSignalFn = Box<dyn Fn(TokenType, Option<Name128>, Name128) + Send + Sync>;

#[derive(Default)]
struct Observers {
    rollback: Vec<TokenSignalFn>,
    remove: Vec<TokenSignalFn>,
}

/// A key restoration to announce once the rollback batch has committed.
enum Note {
    Rollback(TokenType, Option<Name128>, Name128),
    Remove(TokenType, Option<Name128>, Name128),
}

/// The persistent, savepoint-capable token store.
pub struct TokenDatabase {
    // Savepoints hold adapter snapshots; keep them declared before the
    // adapter so they are released first on drop.
    savepoints: Mutex<SavepointStack>,
    observers: RwLock<Observers>,
    adapter: StoreAdapter,
    log_path: PathBuf,
}

impl std::fmt::Debug for TokenDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenDatabase")
            .field("log_path", &self.log_path)
            .finish_non_exhaustive()
    }
}

impl TokenDatabase {
    /// Opens the database, creating the directory and key spaces when
    /// missing, and replays the checkpoint log if one was persisted.
    pub fn open(config: DbConfig) -> Result<Self> {
        fs::create_dir_all(&config.db_path).map_err(|err| Error::Database {
            reason: format!("cannot create {}: {err}", config.db_path.display()),
        })?;
        let adapter = StoreAdapter::open(&config.db_path, config.cache_size_mib, config.profile)?;

        let db = Self {
            savepoints: Mutex::new(SavepointStack::new()),
            observers: RwLock::new(Observers::default()),
            adapter,
            log_path: config.db_path.join(SAVEPOINTS_LOG_FILENAME),
        };

        if db.log_path.exists() {
            let groups = persist::load_log(&db.log_path)?;
            let count = groups.len();
            {
                let mut stack = db.savepoints.lock();
                for group in groups {
                    stack.push_persistent(group.seq, group.entries)?;
                }
            }
            fs::remove_file(&db.log_path).map_err(|source| Error::Persist { source })?;
            info!(savepoints = count, "restored savepoint stack from checkpoint log");
        }

        info!(path = %config.db_path.display(), "token database open");
        Ok(db)
    }

    /// Closes the database. With `persist` set, the savepoint stack is
    /// materialized to the checkpoint log first; without it, all pending
    /// rollback information is discarded.
    pub fn close(self, persist: bool) -> Result<()> {
        let stack = self.savepoints.into_inner();
        if persist && !stack.is_empty() {
            let count = stack.len();
            let groups = materialize(stack)?;
            persist::write_log(&self.log_path, &groups)?;
            info!(savepoints = count, "persisted savepoint stack");
        }
        Ok(())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Writes a typed token value.
    ///
    /// `domain` must be present exactly when `ty` is `Token`; every other
    /// type takes its canonical prefix. `op` is `Add` for first writes and
    /// `Update` for overwrites; the distinction drives rollback.
    pub fn put_token(
        &self,
        ty: TokenType,
        op: ActionOp,
        domain: Option<Name128>,
        key: Name128,
        value: &[u8],
    ) -> Result<()> {
        let prefix = self.token_prefix(ty, domain)?;
        if op == ActionOp::Put {
            return DatabaseSnafu {
                reason: "op `put` is reserved for asset values".to_string(),
            }
            .fail();
        }

        let encoded = keys::token_key(&prefix, &key);
        self.adapter.put(Family::Tokens, &encoded, value)?;

        let data = match domain {
            Some(domain) => ActionData::TokenFullKey { domain, key },
            None => ActionData::TokenKey { key },
        };
        self.savepoints.lock().record(ty, op, data)
    }

    /// Writes a batch of token values sharing one prefix in a single
    /// atomic batch (the `issue_tokens` path). Records one action
    /// descriptor covering the whole key list.
    pub fn put_tokens(
        &self,
        ty: TokenType,
        op: ActionOp,
        domain: Option<Name128>,
        names: &[Name128],
        values: &[Vec<u8>],
    ) -> Result<()> {
        let prefix = self.token_prefix(ty, domain)?;
        if op == ActionOp::Put {
            return DatabaseSnafu {
                reason: "op `put` is reserved for asset values".to_string(),
            }
            .fail();
        }
        if names.len() != values.len() {
            return DatabaseSnafu {
                reason: format!("{} keys but {} values", names.len(), values.len()),
            }
            .fail();
        }

        let ops: Vec<BatchOp> = names
            .iter()
            .zip(values)
            .map(|(name, value)| BatchOp::Put {
                family: Family::Tokens,
                key: keys::token_key(&prefix, name).to_vec(),
                value: value.clone(),
            })
            .collect();
        self.adapter.write_batch(&ops, false)?;

        self.savepoints.lock().record(
            ty,
            op,
            ActionData::TokenKeys { prefix, keys: names.to_vec() },
        )
    }

    /// Writes an asset balance. Always an idempotent overwrite.
    pub fn put_asset(&self, address: &Address, symbol: Symbol, value: &[u8]) -> Result<()> {
        let encoded = keys::asset_key(symbol, address);
        self.adapter.put(Family::Assets, &encoded, value)?;
        self.savepoints.lock().record(
            TokenType::Asset,
            ActionOp::Put,
            ActionData::AssetKey { key: encoded },
        )
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// True if the token key exists.
    pub fn exists_token(&self, ty: TokenType, domain: Option<Name128>, key: Name128) -> Result<bool> {
        let prefix = self.token_prefix(ty, domain)?;
        let encoded = keys::token_key(&prefix, &key);
        Ok(self.adapter.get(Family::Tokens, &encoded)?.is_some())
    }

    /// True if a balance exists for the address and symbol.
    pub fn exists_asset(&self, address: &Address, symbol: Symbol) -> Result<bool> {
        let encoded = keys::asset_key(symbol, address);
        Ok(self.adapter.get(Family::Assets, &encoded)?.is_some())
    }

    /// Reads a token value; a miss is `TokenNotFound`.
    pub fn read_token(
        &self,
        ty: TokenType,
        domain: Option<Name128>,
        key: Name128,
    ) -> Result<Vec<u8>> {
        self.read_token_opt(ty, domain, key)?
            .ok_or(Error::TokenNotFound { domain, key })
    }

    /// Reads a token value; a miss is `None`.
    pub fn read_token_opt(
        &self,
        ty: TokenType,
        domain: Option<Name128>,
        key: Name128,
    ) -> Result<Option<Vec<u8>>> {
        let prefix = self.token_prefix(ty, domain)?;
        let encoded = keys::token_key(&prefix, &key);
        Ok(self.adapter.get(Family::Tokens, &encoded)?)
    }

    /// Reads an asset balance; a miss is `BalanceNotFound`.
    pub fn read_asset(&self, address: &Address, symbol: Symbol) -> Result<Vec<u8>> {
        self.read_asset_opt(address, symbol)?
            .ok_or(Error::BalanceNotFound { address: *address, symbol })
    }

    /// Reads an asset balance; a miss is `None`.
    pub fn read_asset_opt(&self, address: &Address, symbol: Symbol) -> Result<Option<Vec<u8>>> {
        let encoded = keys::asset_key(symbol, address);
        Ok(self.adapter.get(Family::Assets, &encoded)?)
    }

    /// Scans all tokens of one type (or one domain), in key order, skipping
    /// the first `skip` entries. The visitor receives the 16-byte key
    /// suffix and the value, and returns `false` to stop. Returns the
    /// number of entries visited.
    pub fn read_tokens_range(
        &self,
        ty: TokenType,
        domain: Option<Name128>,
        skip: usize,
        mut visitor: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<usize> {
        let prefix = self.token_prefix(ty, domain)?;
        let mut skipped = 0usize;
        let mut visited = 0usize;
        self.adapter.for_each_prefix(Family::Tokens, prefix.as_bytes(), |key, value| {
            if skipped < skip {
                skipped += 1;
                return true;
            }
            visited += 1;
            visitor(&key[Name128::LEN..], value)
        })?;
        Ok(visited)
    }

    /// Scans all balances of one symbol, in address order, skipping the
    /// first `skip` entries. The visitor receives the address bytes and the
    /// value. Returns the number of entries visited.
    pub fn read_assets_range(
        &self,
        symbol: Symbol,
        skip: usize,
        mut visitor: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<usize> {
        let prefix = keys::asset_prefix(symbol);
        let mut skipped = 0usize;
        let mut visited = 0usize;
        self.adapter.for_each_prefix(Family::Assets, &prefix, |key, value| {
            if skipped < skip {
                skipped += 1;
                return true;
            }
            visited += 1;
            visitor(&key[keys::ASSET_PREFIX_LEN..], value)
        })?;
        Ok(visited)
    }

    // ========================================================================
    // Savepoints
    // ========================================================================

    /// Pushes a savepoint with the given sequence, capturing a fresh
    /// adapter snapshot. Fails with `SeqNotValid` unless `seq` exceeds the
    /// current top's.
    pub fn add_savepoint(&self, seq: i64) -> Result<()> {
        let mut stack = self.savepoints.lock();
        let snapshot = self.adapter.snapshot()?;
        stack.push_runtime(seq, snapshot)
    }

    /// Pushes a savepoint and returns a scoped session for it. Without an
    /// explicit `seq`, one past the current top is used.
    pub fn new_savepoint_session(&self, seq: Option<i64>) -> Result<SavepointSession<'_>> {
        let seq = match seq {
            Some(seq) => seq,
            None => self.savepoints.lock().back_seq().map_or(1, |prev| prev + 1),
        };
        self.add_savepoint(seq)?;
        Ok(SavepointSession { db: self, seq, done: false })
    }

    /// Undoes every mutation recorded in the top savepoint and removes it.
    ///
    /// Prior values are read from the snapshot captured at push time and
    /// applied as one durable batch: a crash leaves the store either fully
    /// rolled back or untouched.
    pub fn rollback_to_latest_savepoint(&self) -> Result<()> {
        let sp = self.savepoints.lock().pop_back()?;
        let seq = sp.seq;
        debug!(seq, "rolling back savepoint");
        match sp.kind {
            SavepointKind::Runtime { snapshot, actions } => {
                self.apply_runtime_rollback(&snapshot, actions)
            }
            SavepointKind::Persistent { entries } => self.apply_persistent_rollback(entries),
        }
    }

    /// Drops savepoints from the front while `front.seq < until`, making
    /// that history permanent.
    pub fn pop_savepoints(&self, until: i64) -> Result<()> {
        self.savepoints.lock().pop_front_until(until)
    }

    /// Drops the top savepoint without restoring state (the transaction
    /// succeeded).
    pub fn pop_back_savepoint(&self) -> Result<()> {
        self.savepoints.lock().pop_back().map(drop)
    }

    /// Merges the top two savepoints into one logical checkpoint.
    pub fn squash(&self) -> Result<()> {
        self.savepoints.lock().squash()
    }

    /// Sequence of the current top savepoint.
    pub fn latest_savepoint_seq(&self) -> Result<i64> {
        self.savepoints.lock().back_seq().ok_or(Error::NoSavepoint)
    }

    /// Number of savepoints currently on the stack.
    pub fn savepoints_size(&self) -> usize {
        self.savepoints.lock().len()
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Registers a callback fired once per restored key during rollback.
    pub fn on_rollback_token_value(
        &self,
        callback: impl Fn(TokenType, Option<Name128>, Name128) + Send + Sync + 'static,
    ) {
        self.observers.write().rollback.push(Box::new(callback));
    }

    /// Registers a callback fired for keys removed by rollback (undone
    /// `add`s).
    pub fn on_remove_token_value(
        &self,
        callback: impl Fn(TokenType, Option<Name128>, Name128) + Send + Sync + 'static,
    ) {
        self.observers.write().remove.push(Box::new(callback));
    }

    fn notify(&self, notes: Vec<Note>) {
        let observers = self.observers.read();
        for note in notes {
            match note {
                Note::Rollback(ty, domain, key) => {
                    for callback in &observers.rollback {
                        callback(ty, domain, key);
                    }
                }
                Note::Remove(ty, domain, key) => {
                    for callback in &observers.remove {
                        callback(ty, domain, key);
                    }
                }
            }
        }
    }

    // ========================================================================
    // Rollback application
    // ========================================================================

    fn apply_runtime_rollback(&self, snapshot: &StoreSnapshot, actions: Vec<Action>) -> Result<()> {
        let mut batch = Vec::new();
        let mut restored: HashSet<(Family, Vec<u8>)> = HashSet::new();
        let mut notes = Vec::new();

        for action in &actions {
            for (family, encoded, signal) in expand_action(action) {
                self.stage_restore(
                    snapshot,
                    action.op,
                    family,
                    encoded,
                    signal,
                    &mut restored,
                    &mut batch,
                    &mut notes,
                )?;
            }
        }

        if !batch.is_empty() {
            self.adapter.write_batch(&batch, true)?;
        }
        self.notify(notes);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_restore(
        &self,
        snapshot: &StoreSnapshot,
        op: ActionOp,
        family: Family,
        encoded: Vec<u8>,
        signal: Option<(TokenType, Option<Name128>, Name128)>,
        restored: &mut HashSet<(Family, Vec<u8>)>,
        batch: &mut Vec<BatchOp>,
        notes: &mut Vec<Note>,
    ) -> Result<()> {
        let slot = (family, encoded.clone());
        match op {
            ActionOp::Add => {
                // An added key cannot have been touched earlier in the same
                // rollback pass; a duplicate means the records are corrupt.
                if !restored.insert(slot) {
                    return DatabaseSnafu {
                        reason: "duplicate key for `add` during rollback".to_string(),
                    }
                    .fail();
                }
                batch.push(BatchOp::Delete { family, key: encoded });
                if let Some((ty, domain, key)) = signal {
                    notes.push(Note::Remove(ty, domain, key));
                }
            }
            ActionOp::Update => {
                if !restored.insert(slot) {
                    return Ok(());
                }
                let prior = snapshot.get(family, &encoded)?.ok_or_else(|| Error::Database {
                    reason: "missing prior value for `update` during rollback".to_string(),
                })?;
                batch.push(BatchOp::Put { family, key: encoded, value: prior });
                if let Some((ty, domain, key)) = signal {
                    notes.push(Note::Rollback(ty, domain, key));
                }
            }
            ActionOp::Put => {
                if !restored.insert(slot) {
                    return Ok(());
                }
                match snapshot.get(family, &encoded)? {
                    Some(prior) => batch.push(BatchOp::Put { family, key: encoded, value: prior }),
                    None => batch.push(BatchOp::Delete { family, key: encoded }),
                }
            }
        }
        Ok(())
    }

    fn apply_persistent_rollback(&self, entries: Vec<RecordedEntry>) -> Result<()> {
        let mut batch = Vec::new();
        let mut restored: HashSet<(Family, Vec<u8>)> = HashSet::new();
        let mut notes = Vec::new();

        for entry in &entries {
            let ty = TokenType::from_u16(entry.ty).ok_or_else(|| Error::Database {
                reason: format!("unknown token type {} in savepoint record", entry.ty),
            })?;
            let op = ActionOp::from_u16(entry.op).ok_or_else(|| Error::Database {
                reason: format!("unknown op {} in savepoint record", entry.op),
            })?;
            let family = if ty == TokenType::Asset { Family::Assets } else { Family::Tokens };

            let slot = (family, entry.key.clone());
            if op == ActionOp::Add {
                if !restored.insert(slot) {
                    return DatabaseSnafu {
                        reason: "duplicate key for `add` during rollback".to_string(),
                    }
                    .fail();
                }
            } else if !restored.insert(slot) {
                continue;
            }

            let signal = if family == Family::Tokens {
                keys::split_token_key(&entry.key).map(|(prefix, key)| {
                    let domain = (ty == TokenType::Token).then_some(prefix);
                    (ty, domain, key)
                })
            } else {
                None
            };

            match op {
                ActionOp::Add => {
                    batch.push(BatchOp::Delete { family, key: entry.key.clone() });
                    if let Some((ty, domain, key)) = signal {
                        notes.push(Note::Remove(ty, domain, key));
                    }
                }
                ActionOp::Update => {
                    if entry.value.is_empty() {
                        return DatabaseSnafu {
                            reason: "missing prior value for `update` during rollback".to_string(),
                        }
                        .fail();
                    }
                    batch.push(BatchOp::Put {
                        family,
                        key: entry.key.clone(),
                        value: entry.value.clone(),
                    });
                    if let Some((ty, domain, key)) = signal {
                        notes.push(Note::Rollback(ty, domain, key));
                    }
                }
                ActionOp::Put => {
                    if entry.value.is_empty() {
                        batch.push(BatchOp::Delete { family, key: entry.key.clone() });
                    } else {
                        batch.push(BatchOp::Put {
                            family,
                            key: entry.key.clone(),
                            value: entry.value.clone(),
                        });
                    }
                }
            }
        }

        if !batch.is_empty() {
            self.adapter.write_batch(&batch, true)?;
        }
        self.notify(notes);
        Ok(())
    }

    fn token_prefix(&self, ty: TokenType, domain: Option<Name128>) -> Result<Name128> {
        if ty == TokenType::Asset {
            return DatabaseSnafu {
                reason: "asset values must go through the asset operations".to_string(),
            }
            .fail();
        }
        match (ty, domain) {
            (TokenType::Token, Some(domain)) => Ok(domain),
            (TokenType::Token, None) => DatabaseSnafu {
                reason: "type `token` requires a domain".to_string(),
            }
            .fail(),
            (_, Some(_)) => DatabaseSnafu {
                reason: format!("type `{}` does not take a domain", ty.name()),
            }
            .fail(),
            (_, None) => Ok(keys::canonical_prefix(ty)),
        }
    }
}

/// Expands one action into `(family, encoded key, signal payload)` tuples.
fn expand_action(action: &Action) -> Vec<(Family, Vec<u8>, Option<(TokenType, Option<Name128>, Name128)>)> {
    match &action.data {
        ActionData::TokenKey { key } => {
            let prefix = keys::canonical_prefix(action.ty);
            vec![(
                Family::Tokens,
                keys::token_key(&prefix, key).to_vec(),
                Some((action.ty, None, *key)),
            )]
        }
        ActionData::TokenFullKey { domain, key } => vec![(
            Family::Tokens,
            keys::token_key(domain, key).to_vec(),
            Some((action.ty, Some(*domain), *key)),
        )],
        ActionData::AssetKey { key } => vec![(Family::Assets, key.to_vec(), None)],
        ActionData::TokenKeys { prefix, keys: names } => names
            .iter()
            .map(|key| {
                let domain = (action.ty == TokenType::Token).then_some(*prefix);
                (
                    Family::Tokens,
                    keys::token_key(prefix, key).to_vec(),
                    Some((action.ty, domain, *key)),
                )
            })
            .collect(),
    }
}

/// Materializes a savepoint stack into persistent groups, oldest first.
///
/// Prior values are resolved against each savepoint's own snapshot with the
/// same earliest-wins dedup used by rollback, so an `add` that was later
/// `update`d records an empty prior.
fn materialize(stack: SavepointStack) -> Result<Vec<PersistentGroup>> {
    let mut groups = Vec::with_capacity(stack.len());
    for sp in stack.into_savepoints() {
        groups.push(materialize_savepoint(sp)?);
    }
    Ok(groups)
}

fn materialize_savepoint(sp: Savepoint) -> Result<PersistentGroup> {
    let seq = sp.seq;
    match sp.kind {
        SavepointKind::Persistent { entries } => Ok(PersistentGroup { seq, entries }),
        SavepointKind::Runtime { snapshot, actions } => {
            let mut seen: HashSet<(Family, Vec<u8>)> = HashSet::new();
            let mut entries = Vec::new();
            for action in &actions {
                for (family, encoded, _) in expand_action(action) {
                    if !seen.insert((family, encoded.clone())) {
                        continue;
                    }
                    let value = match action.op {
                        ActionOp::Add => Vec::new(),
                        ActionOp::Update => {
                            snapshot.get(family, &encoded)?.ok_or_else(|| Error::Database {
                                reason: "missing prior value while persisting savepoint"
                                    .to_string(),
                            })?
                        }
                        ActionOp::Put => snapshot.get(family, &encoded)?.unwrap_or_default(),
                    };
                    entries.push(RecordedEntry {
                        op: action.op as u16,
                        ty: action.ty as u16,
                        key: encoded,
                        value,
                    });
                }
            }
            Ok(PersistentGroup { seq, entries })
        }
    }
}

/// A scoped savepoint handle.
///
/// Dropping the session commits its savepoint (`pop_back`); calling
/// [`SavepointSession::undo`] rolls it back instead. This is the primitive
/// the host uses to scope a transaction inside a block.
pub struct SavepointSession<'a> {
    db: &'a TokenDatabase,
    seq: i64,
    done: bool,
}

impl SavepointSession<'_> {
    /// Sequence of the savepoint this session owns.
    pub fn seq(&self) -> i64 {
        self.seq
    }

    /// Rolls back the savepoint and consumes the session.
    pub fn undo(mut self) -> Result<()> {
        self.done = true;
        self.db.rollback_to_latest_savepoint()
    }

    /// Commits the savepoint explicitly, surfacing any error that the
    /// implicit drop path would only log.
    pub fn accept(mut self) -> Result<()> {
        self.done = true;
        self.db.pop_back_savepoint()
    }
}

impl Drop for SavepointSession<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(err) = self.db.pop_back_savepoint() {
            warn!(seq = self.seq, %err, "failed to commit savepoint session on drop");
        }
    }
}
