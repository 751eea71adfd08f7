//! Hashing Primitives
//!
//! SHA-256 helpers used for:
//! - Seed commitments and the operator's pre-committed proof
//! - Random oracle input (secret ‖ seed)
//! - Contract state fingerprints (rollback checks, logging)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Length of a SHA-256 digest in bytes.
pub const HASH_LEN: usize = 32;

/// A 256-bit hash value (seed, proof, secret).
///
/// Serialized as lowercase hex in human-readable formats (JSON) and as
/// raw bytes in binary formats (bincode).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// The all-zero value.
    pub const ZERO: Hash256 = Hash256([0; HASH_LEN]);

    /// Create from raw bytes.
    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64 character hex string.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != HASH_LEN {
            return Err(HashParseError::InvalidLength(bytes.len()));
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; HASH_LEN]> for Hash256 {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; HASH_LEN]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Errors from parsing a hex hash.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HashParseError {
    /// Not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Wrong number of bytes.
    #[error("expected {HASH_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

/// Compute the SHA-256 of arbitrary data.
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash256(hasher.finalize().into())
}

/// Hash the 64-byte concatenation `left ‖ right`.
pub fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(left.0);
    hasher.update(right.0);
    Hash256(hasher.finalize().into())
}

/// Deterministic hasher for contract state fingerprints.
///
/// Order of updates is significant.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for contract state.
    pub fn for_contract_state() -> Self {
        Self::new(b"RAMBLER_STATE_V1")
    }

    /// Update with a length-prefixed string.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u64(value.len() as u64);
        self.hasher.update(value.as_bytes());
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u16 value (little-endian).
    #[inline]
    pub fn update_u16(&mut self, value: u16) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i64 value (little-endian).
    #[inline]
    pub fn update_i64(&mut self, value: i64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with a hash.
    #[inline]
    pub fn update_hash(&mut self, value: &Hash256) {
        self.hasher.update(value.0);
    }

    /// Update with an optional hash (presence byte first).
    #[inline]
    pub fn update_opt_hash(&mut self, value: Option<&Hash256>) {
        match value {
            Some(h) => {
                self.update_u8(1);
                self.update_hash(h);
            }
            None => self.update_u8(0),
        }
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> Hash256 {
        Hash256(self.hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // sha256("abc")
        let hash = sha256(b"abc");
        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_pair_is_concatenation() {
        let a = Hash256([1; 32]);
        let b = Hash256([2; 32]);

        let mut joined = Vec::with_capacity(64);
        joined.extend_from_slice(&a.0);
        joined.extend_from_slice(&b.0);

        assert_eq!(hash_pair(&a, &b), sha256(&joined));
        assert_ne!(hash_pair(&a, &b), hash_pair(&b, &a));
    }

    #[test]
    fn test_hex_parse() {
        let hash = sha256(b"test");
        let parsed: Hash256 = hash.to_hex().parse().unwrap();
        assert_eq!(parsed, hash);

        assert!(matches!(
            Hash256::from_hex("abcd"),
            Err(HashParseError::InvalidLength(2))
        ));
        assert!(matches!(
            Hash256::from_hex("zz"),
            Err(HashParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_json_uses_hex() {
        let hash = Hash256([0xab; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));

        let back: Hash256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_bincode_uses_raw_bytes() {
        let hash = Hash256([7; 32]);
        let bytes = bincode::serialize(&hash).unwrap();
        assert_eq!(bytes.len(), 32);
        let back: Hash256 = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_state_hasher_order_matters() {
        let hash1 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(1);
            h.update_u32(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(2);
            h.update_u32(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_optional_hash_is_distinguished() {
        let with_zero = {
            let mut h = StateHasher::for_contract_state();
            h.update_opt_hash(Some(&Hash256::ZERO));
            h.finalize()
        };
        let without = {
            let mut h = StateHasher::for_contract_state();
            h.update_opt_hash(None);
            h.finalize()
        };
        assert_ne!(with_zero, without);
    }
}
