//! Serialization helpers.
//!
//! Typed payloads are (de)serialized with postcard. Wire counts in the
//! checkpoint log use LEB128 variable-length unsigned integers; that format
//! is normative, so the varint routines live here rather than relying on a
//! serializer's internal framing.

use serde::{de::DeserializeOwned, Serialize};
use snafu::Snafu;

/// Error type for codec operations.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// Encoding failed.
    #[snafu(display("Encoding failed: {source}"))]
    Encode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// Decoding failed.
    #[snafu(display("Decoding failed: {source}"))]
    Decode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// A varint ran past the end of the buffer or exceeded 64 bits.
    #[snafu(display("Truncated or oversized varint at offset {offset}"))]
    Varint {
        /// Buffer offset where decoding started.
        offset: usize,
    },
}

/// Encodes a value to bytes using postcard serialization.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|source| CodecError::Encode { source })
}

/// Decodes bytes to a value using postcard deserialization.
///
/// # Errors
///
/// Returns `CodecError::Decode` if deserialization fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|source| CodecError::Decode { source })
}

/// Appends an LEB128-encoded unsigned integer to `buf`.
pub fn encode_varuint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Decodes an LEB128 unsigned integer from `buf` starting at `*cursor`,
/// advancing the cursor past it.
///
/// # Errors
///
/// Returns `CodecError::Varint` on truncation or an encoding wider than 64
/// bits.
pub fn decode_varuint(buf: &[u8], cursor: &mut usize) -> Result<u64, CodecError> {
    let start = *cursor;
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *buf.get(*cursor).ok_or(CodecError::Varint { offset: start })?;
        *cursor += 1;
        if shift >= 64 || (shift == 63 && byte > 1) {
            return Err(CodecError::Varint { offset: start });
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varuint_round_trip() {
        let samples = [0u64, 1, 127, 128, 300, 16_383, 16_384, u32::MAX as u64, u64::MAX];
        for value in samples {
            let mut buf = Vec::new();
            encode_varuint(&mut buf, value);
            let mut cursor = 0;
            let decoded = decode_varuint(&buf, &mut cursor).expect("decode");
            assert_eq!(decoded, value);
            assert_eq!(cursor, buf.len());
        }
    }

    #[test]
    fn test_varuint_single_byte_values() {
        let mut buf = Vec::new();
        encode_varuint(&mut buf, 127);
        assert_eq!(buf, vec![0x7f]);
    }

    #[test]
    fn test_varuint_truncated_fails() {
        let buf = vec![0x80u8, 0x80];
        let mut cursor = 0;
        assert!(decode_varuint(&buf, &mut cursor).is_err());
    }

    #[test]
    fn test_varuint_sequential_decode() {
        let mut buf = Vec::new();
        encode_varuint(&mut buf, 5);
        encode_varuint(&mut buf, 70_000);
        let mut cursor = 0;
        assert_eq!(decode_varuint(&buf, &mut cursor).expect("first"), 5);
        assert_eq!(decode_varuint(&buf, &mut cursor).expect("second"), 70_000);
        assert_eq!(cursor, buf.len());
    }

    #[test]
    fn test_postcard_round_trip() {
        let original = vec![1u32, 2, 3];
        let bytes = encode(&original).expect("encode");
        let decoded: Vec<u32> = decode(&bytes).expect("decode");
        assert_eq!(original, decoded);
    }
}
