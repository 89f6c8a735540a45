//! Core chain primitives for the tokenledger storage engine.
//!
//! This crate provides the foundational types consumed by the engine:
//! - Fixed-width name, address, symbol and asset primitives
//! - Token type and mutation op discriminants
//! - Typed payload definitions stored above the byte-oriented engine
//! - Serialization helpers (postcard for payloads, LEB128 for wire counts)

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod defs;
pub mod name;
pub mod token_type;
pub mod types;

// Re-export commonly used types at crate root
pub use codec::{decode, decode_varuint, encode, encode_varuint, CodecError};
pub use defs::{
    AuthorizerWeight, DomainDef, FungibleDef, GroupDef, GroupNode, LockDef, Meta, Permission,
    SuspendDef, SuspendStatus, TokenDef, TokenValue,
};
pub use name::{Name128, ParseNameError};
pub use token_type::{ActionOp, TokenType};
pub use types::{Address, Asset, Symbol};
