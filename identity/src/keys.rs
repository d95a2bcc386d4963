//! Validator addresses and consensus public keys.

use ed25519_dalek::VerifyingKey;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{IdentityError, IdentityResult};

/// Length of a validator address in bytes
pub const ADDRESS_LEN: usize = 20;

/// Length of an ed25519 public key in bytes
pub const ED25519_KEY_LEN: usize = 32;

/// Fixed-length validator identifier. Orders byte-lexicographically.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Builds an address from raw bytes; anything but 20 bytes is rejected.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; ADDRESS_LEN]>::try_from(bytes).ok().map(Address)
    }

    /// First 20 bytes of SHA-256 over the key bytes.
    pub fn derive(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[..ADDRESS_LEN]);
        Address(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }
}

impl FromStr for Address {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)
            .map_err(|e| IdentityError::InvalidConfig(format!("bad address {:?}: {}", s, e)))?;
        Address::from_slice(&bytes).ok_or_else(|| {
            IdentityError::InvalidConfig(format!("address {:?} is {} bytes, want {}", s, bytes.len(), ADDRESS_LEN))
        })
    }
}

// Hex strings in human-readable formats, raw bytes otherwise.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            text.parse().map_err(de::Error::custom)
        } else {
            <[u8; ADDRESS_LEN]>::deserialize(deserializer).map(Address)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

/// Signature algorithm of a consensus key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    Ed25519,
    /// Anything the engine reported that we do not accept, kept verbatim
    Unsupported(String),
}

impl KeyAlgorithm {
    /// Parses the engine's key type string. Never fails; unknown names map
    /// to [`KeyAlgorithm::Unsupported`] so the caller decides how to reject.
    pub fn parse(name: &str) -> Self {
        match name {
            "ed25519" => KeyAlgorithm::Ed25519,
            other => KeyAlgorithm::Unsupported(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            KeyAlgorithm::Ed25519 => "ed25519",
            KeyAlgorithm::Unsupported(name) => name,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, KeyAlgorithm::Ed25519)
    }
}

/// Typed consensus key material
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    pub algorithm: KeyAlgorithm,
    pub data: Vec<u8>,
}

impl PublicKey {
    pub fn new(algorithm: KeyAlgorithm, data: Vec<u8>) -> Self {
        Self { algorithm, data }
    }

    pub fn ed25519(data: impl Into<Vec<u8>>) -> Self {
        Self::new(KeyAlgorithm::Ed25519, data.into())
    }

    /// Rejects every algorithm but ed25519.
    pub fn ensure_supported(&self) -> IdentityResult<()> {
        if self.algorithm.is_supported() {
            Ok(())
        } else {
            Err(IdentityError::InvalidKeyAlgorithm(self.algorithm.name().to_string()))
        }
    }

    /// Parses the key bytes as an ed25519 point.
    pub fn verifying_key(&self) -> IdentityResult<VerifyingKey> {
        self.ensure_supported()?;
        let bytes: [u8; ED25519_KEY_LEN] = self.data.as_slice().try_into().map_err(|_| {
            IdentityError::InvalidPublicKey(format!(
                "ed25519 key is {} bytes, want {}",
                self.data.len(),
                ED25519_KEY_LEN
            ))
        })?;
        VerifyingKey::from_bytes(&bytes).map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))
    }

    pub fn address(&self) -> Address {
        Address::derive(&self.data)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}:{})", self.algorithm.name(), hex::encode(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn test_address_hex_round_trip() {
        let addr: Address = "F3FC12B8442A3FF95156331F3246AD9EFE232947".parse().unwrap();
        assert_eq!(addr.to_hex(), "f3fc12b8442a3ff95156331f3246ad9efe232947");
        assert!("f3fc12".parse::<Address>().is_err());
        assert!("zz".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_json_is_hex() {
        let addr = Address::from([0xab; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(20)));
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), addr);

        let raw = bincode::serialize(&addr).unwrap();
        assert_eq!(raw.len(), ADDRESS_LEN);
        assert_eq!(bincode::deserialize::<Address>(&raw).unwrap(), addr);
    }

    #[test]
    fn test_address_ordering_is_bytewise() {
        let low = Address::from([0u8; 20]);
        let mut high_bytes = [0u8; 20];
        high_bytes[0] = 1;
        assert!(low < Address::from(high_bytes));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!(KeyAlgorithm::parse("ed25519"), KeyAlgorithm::Ed25519);
        let bad = KeyAlgorithm::parse("ed25520");
        assert!(!bad.is_supported());
        assert_eq!(bad.name(), "ed25520");
    }

    #[test]
    fn test_verifying_key_validation() {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let key = PublicKey::ed25519(signing.verifying_key().to_bytes().to_vec());
        assert!(key.verifying_key().is_ok());
        assert_eq!(key.address(), Address::derive(&key.data));

        let short = PublicKey::ed25519(vec![1, 2, 3]);
        assert!(matches!(short.verifying_key(), Err(IdentityError::InvalidPublicKey(_))));

        let wrong = PublicKey::new(KeyAlgorithm::parse("secp256k1"), vec![0; 33]);
        assert!(matches!(wrong.verifying_key(), Err(IdentityError::InvalidKeyAlgorithm(_))));
    }
}
