//! Key encoding for the token storage engine.
//!
//! Token keys are `prefix(16B) ‖ key(16B)`, 32 bytes fixed. The prefix is
//! the owning domain for the `token` type and a canonical constant for
//! every other type, which makes prefix seeks select exactly one type (or
//! one domain).
//!
//! Asset keys are `symbol_id(4B BE) ‖ address(33B)`, 37 bytes fixed, so a
//! symbol prefix scan yields all balances for that symbol in address order.

use byteorder::{BigEndian, ByteOrder};
use tokenledger_types::{Address, Name128, Symbol, TokenType};

/// Width of an encoded token key in bytes.
pub const TOKEN_KEY_LEN: usize = 2 * Name128::LEN;

/// Width of an encoded asset key in bytes.
pub const ASSET_KEY_LEN: usize = ASSET_PREFIX_LEN + Address::LEN;

/// Width of the symbol prefix of an asset key in bytes.
pub const ASSET_PREFIX_LEN: usize = 4;

const PREFIX_DOMAIN: Name128 = Name128::from_static(b".domain");
const PREFIX_GROUP: Name128 = Name128::from_static(b".group");
const PREFIX_FUNGIBLE: Name128 = Name128::from_static(b".fungible");
const PREFIX_SUSPEND: Name128 = Name128::from_static(b".suspend");
const PREFIX_LOCK: Name128 = Name128::from_static(b".lock");
const PREFIX_EVT_LINK: Name128 = Name128::from_static(b".evtlink");
const PREFIX_PROD_VOTE: Name128 = Name128::from_static(b".prodvote");

/// Returns the canonical key prefix for a non-token, non-asset type.
///
/// `Token` keys take their prefix from the caller-supplied domain and
/// `Asset` keys live in their own family; the facade routes both before
/// reaching this table.
pub fn canonical_prefix(ty: TokenType) -> Name128 {
    match ty {
        TokenType::Domain => PREFIX_DOMAIN,
        TokenType::Group => PREFIX_GROUP,
        TokenType::Fungible => PREFIX_FUNGIBLE,
        TokenType::Suspend => PREFIX_SUSPEND,
        TokenType::Lock => PREFIX_LOCK,
        TokenType::EvtLink => PREFIX_EVT_LINK,
        TokenType::ProdVote => PREFIX_PROD_VOTE,
        TokenType::Token | TokenType::Asset => {
            debug_assert!(false, "{} has no canonical prefix", ty.name());
            Name128::EMPTY
        }
    }
}

/// Encodes a token key from its prefix and key name.
pub fn token_key(prefix: &Name128, key: &Name128) -> [u8; TOKEN_KEY_LEN] {
    let mut buf = [0u8; TOKEN_KEY_LEN];
    buf[..Name128::LEN].copy_from_slice(prefix.as_bytes());
    buf[Name128::LEN..].copy_from_slice(key.as_bytes());
    buf
}

/// Splits an encoded token key back into `(prefix, key)`.
pub fn split_token_key(bytes: &[u8]) -> Option<(Name128, Name128)> {
    if bytes.len() != TOKEN_KEY_LEN {
        return None;
    }
    let mut prefix = [0u8; Name128::LEN];
    let mut key = [0u8; Name128::LEN];
    prefix.copy_from_slice(&bytes[..Name128::LEN]);
    key.copy_from_slice(&bytes[Name128::LEN..]);
    Some((Name128::from_raw(prefix), Name128::from_raw(key)))
}

/// Encodes an asset key from the balance symbol and holder address.
pub fn asset_key(symbol: Symbol, address: &Address) -> [u8; ASSET_KEY_LEN] {
    let mut buf = [0u8; ASSET_KEY_LEN];
    BigEndian::write_u32(&mut buf[..ASSET_PREFIX_LEN], symbol.id());
    buf[ASSET_PREFIX_LEN..].copy_from_slice(address.as_bytes());
    buf
}

/// Returns the scan prefix selecting every balance of a symbol.
pub fn asset_prefix(symbol: Symbol) -> [u8; ASSET_PREFIX_LEN] {
    let mut buf = [0u8; ASSET_PREFIX_LEN];
    BigEndian::write_u32(&mut buf, symbol.id());
    buf
}

/// Splits an encoded asset key back into `(symbol_id, address)`.
pub fn split_asset_key(bytes: &[u8]) -> Option<(u32, Address)> {
    if bytes.len() != ASSET_KEY_LEN {
        return None;
    }
    let id = BigEndian::read_u32(&bytes[..ASSET_PREFIX_LEN]);
    let mut address = [0u8; Address::LEN];
    address.copy_from_slice(&bytes[ASSET_PREFIX_LEN..]);
    Some((id, Address::from_bytes(address)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_key_layout() {
        let prefix: Name128 = ".domain".parse().expect("name");
        let key: Name128 = "music".parse().expect("name");
        let encoded = token_key(&prefix, &key);

        assert_eq!(encoded.len(), 32);
        assert_eq!(&encoded[..16], prefix.as_bytes());
        assert_eq!(&encoded[16..], key.as_bytes());
        assert_eq!(split_token_key(&encoded), Some((prefix, key)));
    }

    #[test]
    fn test_split_token_key_rejects_wrong_width() {
        assert_eq!(split_token_key(&[0u8; 31]), None);
        assert_eq!(split_token_key(&[0u8; 33]), None);
    }

    #[test]
    fn test_canonical_prefixes_are_distinct() {
        let prefixed = [
            TokenType::Domain,
            TokenType::Group,
            TokenType::Fungible,
            TokenType::Suspend,
            TokenType::Lock,
            TokenType::EvtLink,
            TokenType::ProdVote,
        ];
        let mut prefixes: Vec<Name128> = prefixed.iter().map(|&t| canonical_prefix(t)).collect();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), prefixed.len());
    }

    #[test]
    fn test_asset_key_groups_by_symbol() {
        let addr_lo = Address::from_bytes([0x01; Address::LEN]);
        let addr_hi = Address::from_bytes([0xfe; Address::LEN]);
        let sym = Symbol::new(42, 5);

        let key_lo = asset_key(sym, &addr_lo);
        let key_hi = asset_key(sym, &addr_hi);
        let other = asset_key(Symbol::new(43, 5), &addr_lo);

        let prefix = asset_prefix(sym);
        assert!(key_lo.starts_with(&prefix));
        assert!(key_hi.starts_with(&prefix));
        assert!(!other.starts_with(&prefix));
        assert!(key_lo < key_hi);
    }

    #[test]
    fn test_asset_key_round_trip() {
        let address = Address::from_bytes([0x5a; Address::LEN]);
        let encoded = asset_key(Symbol::new(9, 4), &address);
        assert_eq!(split_asset_key(&encoded), Some((9, address)));
    }

    #[test]
    fn test_asset_symbol_order_is_numeric() {
        // Big-endian id encoding keeps prefix order aligned with numeric order.
        assert!(asset_prefix(Symbol::new(255, 0)) < asset_prefix(Symbol::new(256, 0)));
    }
}
