//! Shared types for the block sync queue: the 32-byte block identifier
//! and the buffered block record.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const HASH_SIZE: usize = 32;

/// A 32-byte content-derived block identifier.
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct BlockHash([u8; HASH_SIZE]);

impl BlockHash {
    /// Create a hash from a 32-byte array
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns raw bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Creates a zeroed hash
    pub fn zeroed() -> Self {
        Self([0u8; HASH_SIZE])
    }

    /// Tries to create a hash from a slice of bytes
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, std::array::TryFromSliceError> {
        let array: [u8; HASH_SIZE] = slice.try_into()?;
        Ok(Self(array))
    }

    /// Constructs a hash from a single little-endian u64 (used in tests)
    pub const fn from_u64(word: u64) -> Self {
        let mut bytes = [0u8; HASH_SIZE];
        let le = word.to_le_bytes();
        let mut i = 0;
        while i < 8 {
            bytes[i] = le[i];
            i += 1;
        }
        Self(bytes)
    }
}

impl From<[u8; HASH_SIZE]> for BlockHash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for BlockHash {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from_slice(slice)
    }
}

impl AsRef<[u8]> for BlockHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", hex::encode(self.0))
    }
}

/// A block buffered for import: its chain-assigned number, its content
/// hash, and the encoded block itself. The payload is opaque to the
/// queue and comes back exactly as it went in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct QueuedBlock {
    /// Position in the chain; the ordering and dedup key
    pub number: u64,
    /// Content-derived identifier, used for existence checks
    pub hash: BlockHash,
    /// Encoded block, stored and returned unchanged
    pub payload: Vec<u8>,
}

impl QueuedBlock {
    /// Creates a new buffered block record
    pub fn new(number: u64, hash: BlockHash, payload: Vec<u8>) -> Self {
        Self {
            number,
            hash,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_displays_as_hex() {
        let hash = BlockHash::from_u64(0x0102);
        assert!(hash.to_string().starts_with("0201000000"));
        assert_eq!(hash.to_string().len(), HASH_SIZE * 2);
    }

    #[test]
    fn hash_slice_roundtrip() {
        let hash = BlockHash::from_u64(42);
        let restored = BlockHash::try_from_slice(hash.as_ref()).unwrap();
        assert_eq!(restored, hash);
        assert!(BlockHash::try_from_slice(&[0u8; 7]).is_err());
    }
}
