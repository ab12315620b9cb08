use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// Key width TeslaCrypt uses (AES-256).
pub const DEFAULT_KEY_WIDTH: usize = 32;

/// Identifier of a per-installation key: the hex text of the encrypted AES
/// key found in the file header.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct KeyId(String);

impl KeyId {
    /// Normalizes to uppercase so ids read from headers and typed by users match.
    pub fn new(hex_text: impl AsRef<str>) -> Self {
        Self(hex_text.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The integer the factors of this id reconstruct.
    pub fn to_biguint(&self) -> Option<BigUint> {
        BigUint::parse_bytes(self.0.as_bytes(), 16)
    }
}

impl From<String> for KeyId {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<KeyId> for String {
    fn from(id: KeyId) -> Self {
        id.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recovered (or candidate) symmetric key, big-endian.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AesKey(Vec<u8>);

impl AesKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(text.trim()).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AesKey({})", self.to_hex())
    }
}

impl fmt::Display for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for AesKey {
    type Error = hex::FromHexError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::from_hex(&text)
    }
}

impl From<AesKey> for String {
    fn from(key: AesKey) -> Self {
        key.to_hex()
    }
}
