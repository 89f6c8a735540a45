//! Error types for the token storage engine.

use std::io;

use snafu::Snafu;
use tokenledger_types::{Address, Name128, Symbol};

use crate::adapter::AdapterError;

/// Result type alias for token database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during token database operations.
///
/// Adapter faults ([`Error::Backend`]) and missing prior values during
/// rollback are unrecoverable: the engine never applies a partial rollback,
/// and the host must abort the pending block.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Generic open/close or mutation precondition violation.
    #[snafu(display("Token database precondition violated: {reason}"))]
    Database {
        /// What was violated.
        reason: String,
    },

    /// The backing store reported an error on an operation that must
    /// succeed. The engine is poisoned.
    #[snafu(display("Backing store failure: {source}"))]
    Backend {
        /// The underlying adapter error.
        source: AdapterError,
    },

    /// A token read missed with the throwing read form.
    #[snafu(display("Cannot find token: {key} (domain: {domain:?})"))]
    TokenNotFound {
        /// Domain prefix, present only for the `token` type.
        domain: Option<Name128>,
        /// The missing key.
        key: Name128,
    },

    /// An asset balance read missed with the throwing read form.
    #[snafu(display("Cannot find balance of {symbol} for address {address}"))]
    BalanceNotFound {
        /// The balance holder.
        address: Address,
        /// The requested symbol.
        symbol: Symbol,
    },

    /// A savepoint push with a non-increasing sequence number.
    #[snafu(display("Savepoint seq is not valid, prev: {prev}, curr: {curr}"))]
    SeqNotValid {
        /// Sequence of the current top savepoint.
        prev: i64,
        /// The rejected sequence.
        curr: i64,
    },

    /// A savepoint operation was issued against an empty stack.
    #[snafu(display("There are no savepoints"))]
    NoSavepoint,

    /// Squash preconditions not met.
    #[snafu(display("Cannot squash savepoints: {reason}"))]
    Squash {
        /// Which precondition failed.
        reason: String,
    },

    /// I/O failure while writing the checkpoint log.
    #[snafu(display("Failed to persist savepoints: {source}"))]
    Persist {
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The checkpoint log's dirty flag was set on load.
    #[snafu(display("Checkpoint log is dirty; a previous persist did not complete"))]
    DirtyFlag,

    /// A cache hit decoded to a different type than the one requested.
    #[snafu(display("Cache type mismatch: cached {found}, requested {expected}"))]
    CacheTypeMismatch {
        /// The requested type name.
        expected: &'static str,
        /// The cached type name.
        found: &'static str,
    },
}

impl From<AdapterError> for Error {
    fn from(source: AdapterError) -> Self {
        Error::Backend { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_seq_not_valid() {
        let err = Error::SeqNotValid { prev: 7, curr: 7 };
        assert_eq!(format!("{err}"), "Savepoint seq is not valid, prev: 7, curr: 7");
    }

    #[test]
    fn test_display_no_savepoint() {
        assert_eq!(format!("{}", Error::NoSavepoint), "There are no savepoints");
    }

    #[test]
    fn test_display_dirty_flag() {
        let display = format!("{}", Error::DirtyFlag);
        assert!(display.contains("dirty"), "got: {display}");
    }

    #[test]
    fn test_display_cache_type_mismatch() {
        let err = Error::CacheTypeMismatch { expected: "DomainDef", found: "TokenDef" };
        let display = format!("{err}");
        assert!(display.contains("DomainDef"), "got: {display}");
        assert!(display.contains("TokenDef"), "got: {display}");
    }

    #[test]
    fn test_display_token_not_found() {
        let err = Error::TokenNotFound {
            domain: None,
            key: "d1".parse().expect("name"),
        };
        assert!(format!("{err}").contains("d1"));
    }
}
