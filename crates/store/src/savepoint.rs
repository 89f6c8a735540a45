//! The savepoint stack.
//!
//! A deque of logical checkpoints ordered by strictly increasing sequence
//! number. The top (back) savepoint is the current one; every recorded
//! mutation is charged to it. A savepoint is either *runtime* — holding the
//! store snapshot captured at push time plus the action descriptors applied
//! since — or *persistent* — holding pre-materialized rollback records
//! loaded from the checkpoint log after a restart.
//!
//! This module owns the stack bookkeeping: push, record, pop-back,
//! pop-front-until and squash. Applying a rollback against the store lives
//! with the facade, which owns the adapter and the observer signals.

use std::collections::VecDeque;

use tokenledger_types::{ActionOp, Name128, TokenType};

use crate::adapter::StoreSnapshot;
use crate::error::{DatabaseSnafu, Error, Result, SquashSnafu};
use crate::keys::ASSET_KEY_LEN;
use crate::persist::RecordedEntry;

/// Compact descriptor of the key(s) a recorded mutation touched.
///
/// Only the keys are recorded; prior values are recovered on demand from
/// the savepoint's snapshot.
#[derive(Debug, Clone)]
pub enum ActionData {
    /// A single key under the canonical prefix of the action's type.
    TokenKey {
        /// The written key.
        key: Name128,
    },
    /// A single key under a caller-supplied domain prefix (`token` type).
    TokenFullKey {
        /// The domain prefix.
        domain: Name128,
        /// The written key.
        key: Name128,
    },
    /// An encoded asset key.
    AssetKey {
        /// The full 37-byte asset key.
        key: [u8; ASSET_KEY_LEN],
    },
    /// A batch of keys sharing one prefix (the `issue_tokens` path).
    TokenKeys {
        /// The shared prefix.
        prefix: Name128,
        /// Every written key.
        keys: Vec<Name128>,
    },
}

/// One recorded mutation inside a runtime savepoint.
#[derive(Debug, Clone)]
pub struct Action {
    /// Object class that was mutated.
    pub ty: TokenType,
    /// Which mutation op was applied.
    pub op: ActionOp,
    /// The touched key(s).
    pub data: ActionData,
}

/// The two savepoint forms.
#[derive(Debug)]
pub enum SavepointKind {
    /// Normal form during block execution.
    Runtime {
        /// Store view captured when the savepoint was pushed.
        snapshot: StoreSnapshot,
        /// Mutations recorded since the push, in application order.
        actions: Vec<Action>,
    },
    /// Restored form, present only right after a checkpoint-log load.
    Persistent {
        /// Materialized `(op, type, key, prior-value)` records.
        entries: Vec<RecordedEntry>,
    },
}

/// A single logical checkpoint.
#[derive(Debug)]
pub struct Savepoint {
    /// Strictly increasing sequence number.
    pub seq: i64,
    /// Runtime or persistent payload.
    pub kind: SavepointKind,
}

impl Savepoint {
    /// True if this savepoint holds a snapshot and live action list.
    pub fn is_runtime(&self) -> bool {
        matches!(self.kind, SavepointKind::Runtime { .. })
    }
}

/// Ordered deque of savepoints. Front is oldest, back is current.
#[derive(Default, Debug)]
pub struct SavepointStack {
    savepoints: VecDeque<Savepoint>,
}

impl SavepointStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of savepoints on the stack.
    pub fn len(&self) -> usize {
        self.savepoints.len()
    }

    /// True if no savepoints are open.
    pub fn is_empty(&self) -> bool {
        self.savepoints.is_empty()
    }

    /// Sequence of the current (top) savepoint.
    pub fn back_seq(&self) -> Option<i64> {
        self.savepoints.back().map(|sp| sp.seq)
    }

    fn ensure_monotonic(&self, seq: i64) -> Result<()> {
        if let Some(back) = self.savepoints.back() {
            if back.seq >= seq {
                return Err(Error::SeqNotValid { prev: back.seq, curr: seq });
            }
        }
        Ok(())
    }

    /// Pushes a runtime savepoint holding `snapshot`.
    ///
    /// Fails with `SeqNotValid` unless `seq` exceeds the current top's.
    pub fn push_runtime(&mut self, seq: i64, snapshot: StoreSnapshot) -> Result<()> {
        self.ensure_monotonic(seq)?;
        self.savepoints.push_back(Savepoint {
            seq,
            kind: SavepointKind::Runtime { snapshot, actions: Vec::new() },
        });
        Ok(())
    }

    /// Pushes a persistent savepoint restored from the checkpoint log.
    pub fn push_persistent(&mut self, seq: i64, entries: Vec<RecordedEntry>) -> Result<()> {
        self.ensure_monotonic(seq)?;
        self.savepoints.push_back(Savepoint { seq, kind: SavepointKind::Persistent { entries } });
        Ok(())
    }

    /// Charges a mutation to the current savepoint.
    ///
    /// A no-op when the stack is empty: mutations outside any savepoint are
    /// permanent by definition.
    pub fn record(&mut self, ty: TokenType, op: ActionOp, data: ActionData) -> Result<()> {
        match self.savepoints.back_mut() {
            None => Ok(()),
            Some(sp) => match &mut sp.kind {
                SavepointKind::Runtime { actions, .. } => {
                    actions.push(Action { ty, op, data });
                    Ok(())
                }
                SavepointKind::Persistent { .. } => DatabaseSnafu {
                    reason: "cannot record mutations into a restored savepoint".to_string(),
                }
                .fail(),
            },
        }
    }

    /// Removes and returns the top savepoint.
    pub fn pop_back(&mut self) -> Result<Savepoint> {
        self.savepoints.pop_back().ok_or(Error::NoSavepoint)
    }

    /// Drops savepoints from the front while `front.seq < until`, releasing
    /// each snapshot without applying it. Declares history before `until`
    /// permanent.
    pub fn pop_front_until(&mut self, until: i64) -> Result<()> {
        if self.savepoints.is_empty() {
            return Err(Error::NoSavepoint);
        }
        while self.savepoints.front().is_some_and(|sp| sp.seq < until) {
            self.savepoints.pop_front();
        }
        Ok(())
    }

    /// Merges the top savepoint into the one below it.
    ///
    /// The top's actions are appended after the lower's and the top's
    /// snapshot is released. The lower savepoint keeps its older snapshot,
    /// so a later rollback recovers the state before *both*.
    pub fn squash(&mut self) -> Result<()> {
        if self.savepoints.len() < 2 {
            return SquashSnafu { reason: "fewer than two savepoints".to_string() }.fail();
        }
        if self.savepoints.iter().rev().take(2).any(|sp| !sp.is_runtime()) {
            return SquashSnafu {
                reason: "both savepoints must be in runtime form".to_string(),
            }
            .fail();
        }

        let Some(top) = self.savepoints.pop_back() else {
            return SquashSnafu { reason: "fewer than two savepoints".to_string() }.fail();
        };
        let SavepointKind::Runtime { snapshot, actions: top_actions } = top.kind else {
            return SquashSnafu {
                reason: "both savepoints must be in runtime form".to_string(),
            }
            .fail();
        };
        drop(snapshot);

        // Checked runtime above; the lower savepoint absorbs the actions.
        if let Some(below) = self.savepoints.back_mut() {
            if let SavepointKind::Runtime { actions, .. } = &mut below.kind {
                actions.extend(top_actions);
            }
        }
        Ok(())
    }

    /// Iterates savepoints from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Savepoint> {
        self.savepoints.iter()
    }

    /// Consumes the stack, yielding savepoints from oldest to newest.
    pub fn into_savepoints(self) -> VecDeque<Savepoint> {
        self.savepoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Profile, StoreAdapter};
    use std::path::Path;

    fn adapter() -> StoreAdapter {
        StoreAdapter::open(Path::new("."), 8, Profile::Memory).expect("open")
    }

    fn name(s: &str) -> Name128 {
        s.parse().expect("name")
    }

    #[test]
    fn test_push_requires_increasing_seq() {
        let adapter = adapter();
        let mut stack = SavepointStack::new();
        stack.push_runtime(5, adapter.snapshot().expect("snap")).expect("push");

        let err = stack.push_runtime(5, adapter.snapshot().expect("snap")).unwrap_err();
        assert!(matches!(err, Error::SeqNotValid { prev: 5, curr: 5 }));

        let err = stack.push_runtime(4, adapter.snapshot().expect("snap")).unwrap_err();
        assert!(matches!(err, Error::SeqNotValid { prev: 5, curr: 4 }));

        stack.push_runtime(6, adapter.snapshot().expect("snap")).expect("push");
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.back_seq(), Some(6));
    }

    #[test]
    fn test_record_outside_savepoint_is_noop() {
        let mut stack = SavepointStack::new();
        stack
            .record(TokenType::Domain, ActionOp::Add, ActionData::TokenKey { key: name("d") })
            .expect("record");
        assert!(stack.is_empty());
    }

    #[test]
    fn test_record_charges_top_savepoint() {
        let adapter = adapter();
        let mut stack = SavepointStack::new();
        stack.push_runtime(1, adapter.snapshot().expect("snap")).expect("push");
        stack.push_runtime(2, adapter.snapshot().expect("snap")).expect("push");

        stack
            .record(TokenType::Domain, ActionOp::Add, ActionData::TokenKey { key: name("d") })
            .expect("record");

        let top = stack.pop_back().expect("pop");
        match top.kind {
            SavepointKind::Runtime { actions, .. } => assert_eq!(actions.len(), 1),
            SavepointKind::Persistent { .. } => panic!("expected runtime savepoint"),
        }
        let below = stack.pop_back().expect("pop");
        match below.kind {
            SavepointKind::Runtime { actions, .. } => assert!(actions.is_empty()),
            SavepointKind::Persistent { .. } => panic!("expected runtime savepoint"),
        }
    }

    #[test]
    fn test_record_into_persistent_savepoint_fails() {
        let mut stack = SavepointStack::new();
        stack.push_persistent(1, Vec::new()).expect("push");
        let err = stack
            .record(TokenType::Domain, ActionOp::Add, ActionData::TokenKey { key: name("d") })
            .unwrap_err();
        assert!(matches!(err, Error::Database { .. }));
    }

    #[test]
    fn test_pop_back_on_empty_fails() {
        let mut stack = SavepointStack::new();
        assert!(matches!(stack.pop_back().unwrap_err(), Error::NoSavepoint));
    }

    #[test]
    fn test_pop_front_until_drops_old_savepoints() {
        let adapter = adapter();
        let mut stack = SavepointStack::new();
        for seq in [1, 2, 3, 4] {
            stack.push_runtime(seq, adapter.snapshot().expect("snap")).expect("push");
        }

        stack.pop_front_until(3).expect("pop front");
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.iter().next().map(|sp| sp.seq), Some(3));
        assert_eq!(stack.back_seq(), Some(4));
    }

    #[test]
    fn test_pop_front_until_on_empty_fails() {
        let mut stack = SavepointStack::new();
        assert!(matches!(stack.pop_front_until(10).unwrap_err(), Error::NoSavepoint));
    }

    #[test]
    fn test_squash_needs_two_savepoints() {
        let adapter = adapter();
        let mut stack = SavepointStack::new();
        assert!(matches!(stack.squash().unwrap_err(), Error::Squash { .. }));

        stack.push_runtime(1, adapter.snapshot().expect("snap")).expect("push");
        assert!(matches!(stack.squash().unwrap_err(), Error::Squash { .. }));
    }

    #[test]
    fn test_squash_rejects_persistent_savepoints() {
        let adapter = adapter();
        let mut stack = SavepointStack::new();
        stack.push_persistent(1, Vec::new()).expect("push");
        stack.push_runtime(2, adapter.snapshot().expect("snap")).expect("push");
        assert!(matches!(stack.squash().unwrap_err(), Error::Squash { .. }));
    }

    #[test]
    fn test_squash_merges_actions_in_order() {
        let adapter = adapter();
        let mut stack = SavepointStack::new();
        stack.push_runtime(1, adapter.snapshot().expect("snap")).expect("push");
        stack
            .record(TokenType::Domain, ActionOp::Add, ActionData::TokenKey { key: name("a") })
            .expect("record");
        stack.push_runtime(2, adapter.snapshot().expect("snap")).expect("push");
        stack
            .record(TokenType::Domain, ActionOp::Add, ActionData::TokenKey { key: name("b") })
            .expect("record");

        stack.squash().expect("squash");
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.back_seq(), Some(1));

        let merged = stack.pop_back().expect("pop");
        match merged.kind {
            SavepointKind::Runtime { actions, .. } => {
                assert_eq!(actions.len(), 2);
                match (&actions[0].data, &actions[1].data) {
                    (
                        ActionData::TokenKey { key: first },
                        ActionData::TokenKey { key: second },
                    ) => {
                        assert_eq!(*first, name("a"));
                        assert_eq!(*second, name("b"));
                    }
                    _ => panic!("unexpected action data"),
                }
            }
            SavepointKind::Persistent { .. } => panic!("expected runtime savepoint"),
        }
    }
}
