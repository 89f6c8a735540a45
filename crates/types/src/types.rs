//! Address, symbol and asset primitives.
//!
//! These are the fixed-width pieces that participate in asset key encoding,
//! so every layout here is deterministic and endian-fixed.

use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A compressed public key identifying a balance holder.
///
/// 33 raw bytes; the engine treats it as an opaque, fixed-width identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; Address::LEN]);

impl Address {
    /// Width of an address in bytes (compressed public key).
    pub const LEN: usize = 33;

    /// Builds an address from its raw bytes.
    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Address(bytes)
    }

    /// Returns the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

// [u8; 33] is past serde's array impl range, so the codec is spelled out.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AddressVisitor;

        impl<'de> Visitor<'de> for AddressVisitor {
            type Value = Address;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} address bytes", Address::LEN)
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Address, E> {
                let bytes: [u8; Address::LEN] =
                    v.try_into().map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(Address(bytes))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Address, A::Error> {
                let mut bytes = [0u8; Address::LEN];
                for (i, slot) in bytes.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(Address(bytes))
            }
        }

        deserializer.deserialize_bytes(AddressVisitor)
    }
}

/// A fungible symbol: numeric id plus display precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    id: u32,
    precision: u8,
}

impl Symbol {
    /// Width of the encoded symbol in bytes.
    pub const LEN: usize = 8;

    /// Creates a symbol from its id and precision.
    pub const fn new(id: u32, precision: u8) -> Self {
        Symbol { id, precision }
    }

    /// Numeric symbol id. The id alone determines key ordering.
    pub const fn id(self) -> u32 {
        self.id
    }

    /// Number of decimal places in the display form.
    pub const fn precision(self) -> u8 {
        self.precision
    }

    /// Fixed 8-byte encoding: id big-endian, precision, three zero bytes.
    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        BigEndian::write_u32(&mut buf[0..4], self.id);
        buf[4] = self.precision;
        buf
    }

    /// Decodes the fixed 8-byte layout.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(Symbol {
            id: BigEndian::read_u32(&buf[0..4]),
            precision: buf[4],
        })
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},S#{}", self.precision, self.id)
    }
}

/// A signed balance in some fungible symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Raw amount in the symbol's smallest unit.
    pub amount: i128,
    /// The symbol this amount is denominated in.
    pub symbol: Symbol,
}

impl Asset {
    /// Width of the encoded asset in bytes.
    pub const LEN: usize = 24;

    /// Creates an asset from a raw amount and symbol.
    pub const fn new(amount: i128, symbol: Symbol) -> Self {
        Asset { amount, symbol }
    }

    /// Fixed 24-byte encoding: amount little-endian, then the symbol.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        LittleEndian::write_i128(&mut buf[0..16], self.amount);
        buf[16..24].copy_from_slice(&self.symbol.to_bytes());
        buf
    }

    /// Decodes the fixed 24-byte layout.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(Asset {
            amount: LittleEndian::read_i128(&buf[0..16]),
            symbol: Symbol::from_bytes(&buf[16..24])?,
        })
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = self.symbol.precision() as u32;
        let scale = 10i128.checked_pow(precision).unwrap_or(1);
        let whole = self.amount / scale;
        let frac = (self.amount % scale).unsigned_abs();
        if precision == 0 {
            write!(f, "{} S#{}", whole, self.symbol.id())
        } else {
            write!(
                f,
                "{}.{:0width$} S#{}",
                whole,
                frac,
                self.symbol.id(),
                width = precision as usize
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(fill: u8) -> Address {
        Address::from_bytes([fill; Address::LEN])
    }

    #[test]
    fn test_symbol_encoding_is_big_endian() {
        let sym = Symbol::new(0x0102_0304, 5);
        let bytes = sym.to_bytes();
        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(bytes[4], 5);
        assert_eq!(Symbol::from_bytes(&bytes), Some(sym));
    }

    #[test]
    fn test_symbol_key_order_follows_id() {
        let lo = Symbol::new(7, 4).to_bytes();
        let hi = Symbol::new(8, 0).to_bytes();
        assert!(lo < hi);
    }

    #[test]
    fn test_asset_round_trip() {
        let asset = Asset::new(-1_000_000, Symbol::new(3, 5));
        let bytes = asset.to_bytes();
        assert_eq!(Asset::from_bytes(&bytes), Some(asset));
    }

    #[test]
    fn test_asset_rejects_short_buffer() {
        assert_eq!(Asset::from_bytes(&[0u8; 23]), None);
    }

    #[test]
    fn test_asset_display() {
        let asset = Asset::new(123_450, Symbol::new(1, 4));
        assert_eq!(asset.to_string(), "12.3450 S#1");
    }

    #[test]
    fn test_address_display_is_hex() {
        let a = addr(0xab);
        assert!(a.to_string().starts_with("abab"));
        assert_eq!(a.to_string().len(), Address::LEN * 2);
    }

    #[test]
    fn test_address_postcard_round_trip() {
        let a = addr(0x7f);
        let bytes = postcard::to_allocvec(&a).expect("encode");
        let back: Address = postcard::from_bytes(&bytes).expect("decode");
        assert_eq!(a, back);
    }
}
