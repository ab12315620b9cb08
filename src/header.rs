//! TeslaCrypt file header parsing.
//!
//! Encrypted files start with a fixed 414-byte header followed by the AES-CBC
//! ciphertext. Only the marker, the encrypted AES key, the IV and the
//! original size are needed for recovery.

use crate::error::HeaderError;
use crate::types::KeyId;
use num_bigint::BigUint;
use std::fmt;

pub const HEADER_LEN: usize = 0x19E;

const MARKER_LEN: usize = 4;
const FORMAT_TAG_OFFSET: usize = 4;
const SUPPORTED_FORMAT_TAG: u8 = 0x04;
const AES_KEY_RANGE: std::ops::Range<usize> = 0x108..0x188;
const IV_RANGE: std::ops::Range<usize> = 0x18A..0x19A;
const SIZE_RANGE: std::ops::Range<usize> = 0x19A..0x19E;

const TESLA3_MARKER: [u8; MARKER_LEN] = [0xDE, 0xAD, 0xBE, 0xEF];
const TESLA2_MARKER: [u8; MARKER_LEN] = [0x00, 0x00, 0x00, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// TeslaCrypt 2.x, zeroed marker.
    Tesla2,
    /// TeslaCrypt 3.x and 4.x, `DEADBEEF` marker.
    Tesla3,
}

impl FormatVersion {
    fn from_marker(bytes: &[u8]) -> Option<Self> {
        if bytes == TESLA3_MARKER {
            Some(Self::Tesla3)
        } else if bytes == TESLA2_MARKER {
            Some(Self::Tesla2)
        } else {
            None
        }
    }

    fn marker(&self) -> [u8; MARKER_LEN] {
        match self {
            Self::Tesla2 => TESLA2_MARKER,
            Self::Tesla3 => TESLA3_MARKER,
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tesla2 => write!(f, "TeslaCrypt 2.x"),
            Self::Tesla3 => write!(f, "TeslaCrypt 3.x/4.x"),
        }
    }
}

/// The parsed fixed-size header of an encrypted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherHeader {
    version: FormatVersion,
    key_id: KeyId,
    iv: [u8; 16],
    original_size: u32,
    original_extension: Option<String>,
}

impl CipherHeader {
    /// Parses the header at the start of `data`.
    ///
    /// The marker is checked before the length so that short files without
    /// a marker are reported as [`HeaderError::BadMagic`].
    pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        let marker_bytes = &data[..data.len().min(MARKER_LEN)];
        let has_marker = !marker_bytes.is_empty()
            && [TESLA3_MARKER, TESLA2_MARKER]
                .iter()
                .any(|m| m.starts_with(marker_bytes));
        if !has_marker {
            return Err(HeaderError::BadMagic);
        }

        if let Some(&tag) = data.get(FORMAT_TAG_OFFSET) {
            if tag != SUPPORTED_FORMAT_TAG {
                return Err(HeaderError::UnsupportedVersion(tag));
            }
        }

        if data.len() < HEADER_LEN {
            return Err(HeaderError::Truncated {
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = FormatVersion::from_marker(&data[..MARKER_LEN]).ok_or(HeaderError::BadMagic)?;
        let key_id = parse_key_text(&data[AES_KEY_RANGE])?;

        let mut iv = [0u8; 16];
        iv.copy_from_slice(&data[IV_RANGE]);

        let mut size = [0u8; 4];
        size.copy_from_slice(&data[SIZE_RANGE]);

        Ok(Self {
            version,
            key_id,
            iv,
            original_size: u32::from_le_bytes(size),
            original_extension: None,
        })
    }

    /// Builds a header for writing test fixtures or re-encrypting samples.
    pub fn new(version: FormatVersion, key_id: KeyId, iv: [u8; 16], original_size: u32) -> Self {
        Self {
            version,
            key_id,
            iv,
            original_size,
            original_extension: None,
        }
    }

    pub fn with_original_extension(mut self, extension: Option<String>) -> Self {
        self.original_extension = extension;
        self
    }

    /// Serializes back to the on-disk layout; unused regions are zeroed.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_LEN];
        out[..MARKER_LEN].copy_from_slice(&self.version.marker());
        out[FORMAT_TAG_OFFSET] = SUPPORTED_FORMAT_TAG;

        let key_text = self.key_id.as_str().as_bytes();
        let n = key_text.len().min(AES_KEY_RANGE.len());
        out[AES_KEY_RANGE.start..AES_KEY_RANGE.start + n].copy_from_slice(&key_text[..n]);

        out[IV_RANGE].copy_from_slice(&self.iv);
        out[SIZE_RANGE].copy_from_slice(&self.original_size.to_le_bytes());
        out
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// The integer whose factors contain the AES key.
    pub fn embedded_key(&self) -> BigUint {
        // parse_key_text only accepts hex, so this cannot fail
        self.key_id.to_biguint().unwrap_or_default()
    }

    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }

    pub fn original_size(&self) -> u32 {
        self.original_size
    }

    pub fn original_extension(&self) -> Option<&str> {
        self.original_extension.as_deref()
    }
}

fn parse_key_text(region: &[u8]) -> Result<KeyId, HeaderError> {
    let end = region
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |pos| pos + 1);
    let text = &region[..end];

    if text.is_empty() {
        return Err(HeaderError::CorruptKey("key region is empty".to_string()));
    }
    if let Some(bad) = text.iter().find(|b| !b.is_ascii_hexdigit()) {
        return Err(HeaderError::CorruptKey(format!(
            "unexpected byte 0x{:02x} in key text",
            bad
        )));
    }

    // all bytes are ASCII hex digits at this point
    let text = String::from_utf8_lossy(text);
    Ok(KeyId::new(text))
}
