//! Token type and mutation op discriminants.
//!
//! Every object class the engine stores is identified by a [`TokenType`].
//! The discriminants are part of the checkpoint-log wire format and must
//! never be renumbered.

/// Object class stored by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TokenType {
    /// Domain definition.
    Domain = 1,
    /// Non-fungible token inside a domain. The only type with a
    /// caller-supplied domain prefix.
    Token = 2,
    /// Weighted authority group.
    Group = 3,
    /// Fungible asset specification.
    Fungible = 4,
    /// Suspended (deferred) transaction proposal.
    Suspend = 5,
    /// Asset lock with unlock conditions.
    Lock = 6,
    /// EVT link record.
    EvtLink = 7,
    /// Producer vote state.
    ProdVote = 8,
    /// Fungible balance, keyed by symbol and address. Lives in its own
    /// column family and is never written through `put_token`.
    Asset = 9,
}

impl TokenType {
    /// Total number of token types.
    pub const COUNT: usize = 9;

    /// Returns the human-readable name for this type.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Token => "token",
            Self::Group => "group",
            Self::Fungible => "fungible",
            Self::Suspend => "suspend",
            Self::Lock => "lock",
            Self::EvtLink => "evtlink",
            Self::ProdVote => "prodvote",
            Self::Asset => "asset",
        }
    }

    /// Converts from the wire discriminant.
    #[inline]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Domain),
            2 => Some(Self::Token),
            3 => Some(Self::Group),
            4 => Some(Self::Fungible),
            5 => Some(Self::Suspend),
            6 => Some(Self::Lock),
            7 => Some(Self::EvtLink),
            8 => Some(Self::ProdVote),
            9 => Some(Self::Asset),
            _ => None,
        }
    }

    /// Returns all token types.
    pub const fn all() -> [TokenType; Self::COUNT] {
        [
            Self::Domain,
            Self::Token,
            Self::Group,
            Self::Fungible,
            Self::Suspend,
            Self::Lock,
            Self::EvtLink,
            Self::ProdVote,
            Self::Asset,
        ]
    }
}

/// Mutation op recorded against a savepoint.
///
/// The op decides the rollback effect: `Add` deletes the key, `Update`
/// restores the snapshot value (which must exist), `Put` restores the
/// snapshot value or deletes if the key was absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ActionOp {
    /// First write of a key; rollback deletes it.
    Add = 1,
    /// Overwrite of an existing key; rollback restores the prior value.
    Update = 2,
    /// Idempotent overwrite (assets only); rollback restores or deletes.
    Put = 3,
}

impl ActionOp {
    /// Converts from the wire discriminant.
    #[inline]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Add),
            2 => Some(Self::Update),
            3 => Some(Self::Put),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_type_round_trip() {
        for ty in TokenType::all() {
            let wire = ty as u16;
            assert_eq!(TokenType::from_u16(wire), Some(ty));
        }
    }

    #[test]
    fn test_token_type_rejects_unknown() {
        assert_eq!(TokenType::from_u16(0), None);
        assert_eq!(TokenType::from_u16(10), None);
        assert_eq!(TokenType::from_u16(u16::MAX), None);
    }

    #[test]
    fn test_action_op_round_trip() {
        for op in [ActionOp::Add, ActionOp::Update, ActionOp::Put] {
            assert_eq!(ActionOp::from_u16(op as u16), Some(op));
        }
        assert_eq!(ActionOp::from_u16(0), None);
        assert_eq!(ActionOp::from_u16(4), None);
    }
}
