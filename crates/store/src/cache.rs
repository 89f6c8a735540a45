//! Typed read-through cache in front of the token reads.
//!
//! Entries are decoded values tagged with their runtime type; a hit under
//! the wrong type is an error, never a reinterpretation. The cache
//! subscribes to the database's rollback and remove signals and erases the
//! affected entries synchronously, which is why rollback announces every
//! restored key.
//!
//! Asset reads are not cached: balances are small, hot and byte-decoded at
//! the call site, while the bulk of the working set is typed token values.

use std::any::{Any, TypeId};
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use lru::LruCache;
use parking_lot::Mutex;
use tokenledger_types::{ActionOp, Name128, TokenType, TokenValue};

use crate::db::TokenDatabase;
use crate::error::{Error, Result};

struct CacheEntry {
    tag: TypeId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

struct CacheInner {
    map: Mutex<LruCache<Vec<u8>, CacheEntry>>,
}

impl CacheInner {
    fn erase(&self, ty: TokenType, domain: Option<Name128>, key: Name128) {
        self.map.lock().pop(&cache_key(ty, domain, key));
    }
}

/// Read-through LRU cache of decoded token values.
///
/// Handles are `Arc` clones: an evicted or erased entry stays alive for as
/// long as any caller still holds one, so eviction can never free a value
/// in use.
pub struct TokenCache {
    db: Arc<TokenDatabase>,
    inner: Arc<CacheInner>,
}

impl TokenCache {
    /// Creates a cache over `db` holding up to `capacity` decoded entries,
    /// and subscribes it to the rollback and remove signals.
    pub fn new(db: Arc<TokenDatabase>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        let inner = Arc::new(CacheInner { map: Mutex::new(LruCache::new(capacity)) });

        let weak: Weak<CacheInner> = Arc::downgrade(&inner);
        db.on_rollback_token_value(move |ty, domain, key| {
            if let Some(inner) = weak.upgrade() {
                inner.erase(ty, domain, key);
            }
        });
        let weak: Weak<CacheInner> = Arc::downgrade(&inner);
        db.on_remove_token_value(move |ty, domain, key| {
            if let Some(inner) = weak.upgrade() {
                inner.erase(ty, domain, key);
            }
        });

        Self { db, inner }
    }

    /// Reads a token value through the cache; a miss is `TokenNotFound`.
    pub fn read_token<T: TokenValue>(
        &self,
        ty: TokenType,
        domain: Option<Name128>,
        key: Name128,
    ) -> Result<Arc<T>> {
        if let Some(hit) = self.lookup::<T>(ty, domain, key)? {
            return Ok(hit);
        }
        let bytes = self.db.read_token(ty, domain, key)?;
        self.decode_and_insert(ty, domain, key, &bytes)
    }

    /// Reads a token value through the cache; a miss is `None`.
    pub fn read_token_opt<T: TokenValue>(
        &self,
        ty: TokenType,
        domain: Option<Name128>,
        key: Name128,
    ) -> Result<Option<Arc<T>>> {
        if let Some(hit) = self.lookup::<T>(ty, domain, key)? {
            return Ok(Some(hit));
        }
        match self.db.read_token_opt(ty, domain, key)? {
            Some(bytes) => self.decode_and_insert(ty, domain, key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Writes a typed token value through to the database and caches the
    /// decoded form, so the next read hits.
    ///
    /// # Panics
    ///
    /// The write goes through a clean slot: panics if an entry for the key
    /// is already cached. Erase or roll back first.
    pub fn put_token<T: TokenValue>(
        &self,
        ty: TokenType,
        op: ActionOp,
        domain: Option<Name128>,
        key: Name128,
        value: T,
    ) -> Result<Arc<T>> {
        let cache_key = cache_key(ty, domain, key);
        assert!(
            !self.inner.map.lock().contains(&cache_key),
            "cache slot must be clean before a write-through"
        );

        let bytes = value
            .encode_value()
            .map_err(|err| Error::Database { reason: format!("cannot encode value: {err}") })?;
        self.db.put_token(ty, op, domain, key, &bytes)?;

        let handle = Arc::new(value);
        self.insert_entry::<T>(cache_key, handle.clone());
        Ok(handle)
    }

    /// Removes a cached entry, if present. The backing store is untouched.
    pub fn erase(&self, ty: TokenType, domain: Option<Name128>, key: Name128) {
        self.inner.erase(ty, domain, key);
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.map.lock().len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.map.lock().is_empty()
    }

    /// The database this cache fronts.
    pub fn db(&self) -> &Arc<TokenDatabase> {
        &self.db
    }

    fn lookup<T: TokenValue>(
        &self,
        ty: TokenType,
        domain: Option<Name128>,
        key: Name128,
    ) -> Result<Option<Arc<T>>> {
        let mut map = self.inner.map.lock();
        let Some(entry) = map.get(&cache_key(ty, domain, key)) else {
            return Ok(None);
        };
        if entry.tag != TypeId::of::<T>() {
            return Err(Error::CacheTypeMismatch {
                expected: std::any::type_name::<T>(),
                found: entry.type_name,
            });
        }
        let handle = entry.value.clone().downcast::<T>().map_err(|_| Error::CacheTypeMismatch {
            expected: std::any::type_name::<T>(),
            found: entry.type_name,
        })?;
        Ok(Some(handle))
    }

    fn decode_and_insert<T: TokenValue>(
        &self,
        ty: TokenType,
        domain: Option<Name128>,
        key: Name128,
        bytes: &[u8],
    ) -> Result<Arc<T>> {
        let value = T::decode_value(bytes)
            .map_err(|err| Error::Database { reason: format!("cannot decode value: {err}") })?;
        let handle = Arc::new(value);
        self.insert_entry::<T>(cache_key(ty, domain, key), handle.clone());
        Ok(handle)
    }

    fn insert_entry<T: TokenValue>(&self, cache_key: Vec<u8>, handle: Arc<T>) {
        self.inner.map.lock().put(
            cache_key,
            CacheEntry {
                tag: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                value: handle,
            },
        );
    }
}

fn cache_key(ty: TokenType, domain: Option<Name128>, key: Name128) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3 + 2 * Name128::LEN);
    buf.extend_from_slice(&(ty as u16).to_le_bytes());
    match domain {
        Some(domain) => {
            buf.push(1);
            buf.extend_from_slice(domain.as_bytes());
        }
        None => buf.push(0),
    }
    buf.extend_from_slice(key.as_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_discriminates_domain_presence() {
        let key: Name128 = "k".parse().expect("name");
        let domain: Name128 = "d".parse().expect("name");
        let with = cache_key(TokenType::Token, Some(domain), key);
        let without = cache_key(TokenType::Domain, None, key);
        assert_ne!(with, without);
        assert_ne!(with.len(), without.len());
    }

    #[test]
    fn test_cache_key_discriminates_type() {
        let key: Name128 = "k".parse().expect("name");
        let a = cache_key(TokenType::Group, None, key);
        let b = cache_key(TokenType::Fungible, None, key);
        assert_ne!(a, b);
    }
}
