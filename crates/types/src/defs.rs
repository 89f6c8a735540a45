//! Typed payload definitions.
//!
//! The engine itself stores opaque bytes; these are the decoded shapes the
//! chain layer (and the typed cache) works with. All of them serialize with
//! postcard through the [`TokenValue`] trait.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::codec::{self, CodecError};
use crate::name::Name128;
use crate::types::{Address, Asset, Symbol};

/// A value that can live behind the typed cache: decodable from the
/// engine's stored bytes and re-encodable to them.
pub trait TokenValue: Send + Sync + Sized + 'static {
    /// Encodes the value to its stored byte form.
    fn encode_value(&self) -> Result<Vec<u8>, CodecError>;

    /// Decodes the value from its stored byte form.
    fn decode_value(bytes: &[u8]) -> Result<Self, CodecError>;
}

impl<T> TokenValue for T
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn encode_value(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    fn decode_value(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode(bytes)
    }
}

/// A key and its voting weight inside a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerWeight {
    /// The authorizing key.
    pub key: Address,
    /// Weight contributed toward the threshold.
    pub weight: u32,
}

/// A named, threshold-weighted permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Permission name (`issue`, `transfer`, `manage`).
    pub name: Name128,
    /// Minimum total weight required to satisfy the permission.
    pub threshold: u32,
    /// Authorizers and their weights.
    pub authorizers: Vec<AuthorizerWeight>,
}

/// A metadata entry attached to a domain or token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Metadata key.
    pub key: Name128,
    /// Metadata value.
    pub value: String,
    /// Key that created this entry.
    pub creator: Address,
}

/// Domain definition payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDef {
    /// Domain name.
    pub name: Name128,
    /// Key that created the domain.
    pub creator: Address,
    /// Permission governing token issuance.
    pub issue: Permission,
    /// Permission governing transfers.
    pub transfer: Permission,
    /// Permission governing domain management.
    pub manage: Permission,
    /// Attached metadata.
    pub metas: Vec<Meta>,
}

/// Non-fungible token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDef {
    /// Owning domain.
    pub domain: Name128,
    /// Token name within the domain.
    pub name: Name128,
    /// Current owner keys.
    pub owner: Vec<Address>,
    /// Attached metadata.
    pub metas: Vec<Meta>,
}

/// A node in a group's weighted authority tree: either a leaf key or a
/// threshold over child nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    /// Weight this node contributes to its parent.
    pub weight: u32,
    /// Threshold over children (zero for leaf nodes).
    pub threshold: u32,
    /// Leaf key, if this node is a leaf.
    pub key: Option<Address>,
    /// Child nodes, if this node is an inner threshold.
    pub nodes: Vec<GroupNode>,
}

/// Group definition payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDef {
    /// Group name.
    pub name: Name128,
    /// Key allowed to update the group.
    pub key: Address,
    /// Root of the authority tree.
    pub root: GroupNode,
}

/// Fungible asset specification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleDef {
    /// Display name.
    pub name: Name128,
    /// The symbol this spec defines.
    pub sym: Symbol,
    /// Key that created the spec.
    pub creator: Address,
    /// Permission governing issuance.
    pub issue: Permission,
    /// Permission governing spec management.
    pub manage: Permission,
    /// Hard cap on issuance.
    pub total_supply: Asset,
}

/// Status of a suspended transaction proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspendStatus {
    /// Collecting signatures.
    Proposed,
    /// Executed successfully.
    Executed,
    /// Execution failed.
    Failed,
    /// Cancelled by the proposer.
    Cancelled,
}

/// Suspended transaction proposal payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendDef {
    /// Proposal name.
    pub name: Name128,
    /// Key that proposed it.
    pub proposer: Address,
    /// Current status.
    pub status: SuspendStatus,
    /// Serialized pending transaction.
    pub trx: Vec<u8>,
    /// Collected signatures.
    pub signatures: Vec<Vec<u8>>,
}

/// Asset lock payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDef {
    /// Lock name.
    pub name: Name128,
    /// Key that created the lock.
    pub proposer: Address,
    /// Seconds-since-epoch after which assets may unlock.
    pub unlock_time: u64,
    /// Seconds-since-epoch after which the lock falls through.
    pub deadline: u64,
    /// Locked assets.
    pub assets: Vec<Asset>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(fill: u8) -> Address {
        Address::from_bytes([fill; Address::LEN])
    }

    fn permission(name: &str) -> Permission {
        Permission {
            name: name.parse().expect("name"),
            threshold: 1,
            authorizers: vec![AuthorizerWeight { key: addr(1), weight: 1 }],
        }
    }

    #[test]
    fn test_domain_def_round_trip() {
        let def = DomainDef {
            name: "music".parse().expect("name"),
            creator: addr(9),
            issue: permission("issue"),
            transfer: permission("transfer"),
            manage: permission("manage"),
            metas: vec![Meta {
                key: "genre".parse().expect("name"),
                value: "classical".to_string(),
                creator: addr(9),
            }],
        };
        let bytes = def.encode_value().expect("encode");
        let back = DomainDef::decode_value(&bytes).expect("decode");
        assert_eq!(def, back);
    }

    #[test]
    fn test_group_def_round_trip_nested_tree() {
        let def = GroupDef {
            name: "validators".parse().expect("name"),
            key: addr(2),
            root: GroupNode {
                weight: 0,
                threshold: 2,
                key: None,
                nodes: vec![
                    GroupNode { weight: 1, threshold: 0, key: Some(addr(3)), nodes: vec![] },
                    GroupNode { weight: 1, threshold: 0, key: Some(addr(4)), nodes: vec![] },
                ],
            },
        };
        let bytes = def.encode_value().expect("encode");
        let back = GroupDef::decode_value(&bytes).expect("decode");
        assert_eq!(def, back);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(TokenDef::decode_value(&[0xff, 0xff, 0xff]).is_err());
    }
}
