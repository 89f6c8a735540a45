//! tokenledger-store: the persistent token storage engine.
//!
//! A prefix-partitioned, ordered key-value store for the object types the
//! chain issues and mutates, with a nested savepoint stack for
//! deterministic rollback of block- and transaction-scoped mutations, a
//! typed read-through cache, and a checkpoint log that preserves the
//! savepoint stack across restarts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               TokenCache                    │
//! │   (typed read-through LRU, signal-driven)   │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │             TokenDatabase                   │
//! │  (typed routing, recording, sessions,       │
//! │   rollback, range scans, signals)           │
//! └───────┬───────────────────────┬─────────────┘
//!         │                       │
//! ┌───────▼───────────┐   ┌───────▼─────────────┐
//! │  SavepointStack   │   │    Checkpoint log   │
//! │ (runtime/persist) │   │  (dirty-flag file)  │
//! └───────┬───────────┘   └─────────────────────┘
//!         │
//! ┌───────▼─────────────────────────────────────┐
//! │              StoreAdapter                   │
//! │   (tokens/assets tables, snapshots, redb)   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use tokenledger_store::{DbConfig, TokenDatabase};
//! use tokenledger_types::{ActionOp, TokenType};
//!
//! let db = TokenDatabase::open(DbConfig::default())?;
//!
//! let session = db.new_savepoint_session(None)?;
//! db.put_token(
//!     TokenType::Domain,
//!     ActionOp::Add,
//!     None,
//!     "music".parse().unwrap(),
//!     b"payload",
//! )?;
//! session.accept()?;
//! # Ok::<(), tokenledger_store::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod cache;
pub mod db;
pub mod error;
pub mod keys;
pub mod persist;
pub mod savepoint;

// Re-export commonly used types
pub use adapter::{AdapterError, BatchOp, Family, Profile, StoreAdapter, StoreSnapshot};
pub use cache::TokenCache;
pub use db::{DbConfig, SavepointSession, TokenDatabase};
pub use error::{Error, Result};
pub use keys::{ASSET_KEY_LEN, TOKEN_KEY_LEN};
pub use persist::{PersistentGroup, RecordedEntry, SAVEPOINTS_LOG_FILENAME};
pub use savepoint::{Action, ActionData, Savepoint, SavepointKind, SavepointStack};
