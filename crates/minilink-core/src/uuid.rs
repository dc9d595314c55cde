//! Device identifier codec
//!
//! Every control, state, room and category on the miniserver is keyed by
//! an opaque 128-bit identifier. Its canonical textual form is four
//! hyphen-separated groups of lower-case hex digits, widths 8-4-4-16:
//!
//! ```text
//! 0f86a2fe-0378-3b08-ffffb2d4efc8b5b6
//! ```
//!
//! The wire layout is not a standard UUID: the first three groups are
//! little-endian integers (u32, u16, u16) while the final 8 bytes are
//! emitted as raw byte-to-hex pairs in transmitted order. Identifiers are
//! only ever decoded — this client never writes one back onto the wire —
//! so equality and hashing are defined on the canonical string.

use std::fmt::{self, Write as _};

use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::UUID_SIZE;

/// An opaque 128-bit device/state identifier in canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uuid(String);

impl Uuid {
    /// Decode an identifier from the first 16 bytes of `bytes`.
    ///
    /// Total over any 16-byte input; no validation beyond length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < UUID_SIZE {
            return Err(Error::InvalidLength(bytes.len()));
        }
        let mut buf = bytes;
        Self::read(&mut buf)
    }

    /// Decode an identifier from a running buffer, advancing it 16 bytes.
    pub fn read(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < UUID_SIZE {
            return Err(Error::InvalidLength(buf.remaining()));
        }
        let a = buf.get_u32_le();
        let b = buf.get_u16_le();
        let c = buf.get_u16_le();
        let mut tail = [0u8; 8];
        buf.copy_to_slice(&mut tail);

        let mut s = format!("{a:08x}-{b:04x}-{c:04x}-");
        for byte in tail {
            let _ = write!(s, "{byte:02x}");
        }
        Ok(Self(s))
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uuid {
    /// Structure-file identifiers arrive already canonical; taken as-is.
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Uuid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_known_vector() {
        let bytes = [
            0x04, 0x03, 0x02, 0x01, // u32 LE -> 01020304
            0x05, 0x06, // u16 LE -> 0605
            0x07, 0x08, // u16 LE -> 0807
            0x09, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, // raw pairs
        ];
        let uuid = Uuid::from_bytes(&bytes).unwrap();
        assert_eq!(uuid.as_str(), "01020304-0605-0807-0910111213141516");
    }

    #[test]
    fn decode_is_stable() {
        let bytes = [0xffu8; 16];
        let a = Uuid::from_bytes(&bytes).unwrap();
        let b = Uuid::from_bytes(&bytes).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "ffffffff-ffff-ffff-ffffffffffffffff");
    }

    #[test]
    fn decode_pads_leading_zeroes() {
        let bytes = [
            0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x0a,
        ];
        let uuid = Uuid::from_bytes(&bytes).unwrap();
        assert_eq!(uuid.as_str(), "00000001-0002-0003-000000000000000a");
    }

    #[test]
    fn short_input_rejected() {
        let err = Uuid::from_bytes(&[0u8; 15]).unwrap_err();
        assert!(matches!(err, Error::InvalidLength(15)));
    }

    #[test]
    fn extra_bytes_ignored() {
        let mut bytes = vec![0u8; 24];
        bytes[0] = 0x2a;
        let uuid = Uuid::from_bytes(&bytes).unwrap();
        assert_eq!(uuid.as_str(), "0000002a-0000-0000-0000000000000000");
    }

    #[test]
    fn string_equality() {
        let from_wire = Uuid::from_bytes(&[0u8; 16]).unwrap();
        let from_config = Uuid::from("00000000-0000-0000-0000000000000000");
        assert_eq!(from_wire, from_config);
    }
}
