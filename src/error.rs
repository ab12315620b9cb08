use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a factor set.
#[derive(Debug, Error)]
pub enum FactorError {
    #[error("Invalid factor {0:?}: expected a decimal integer")]
    Parse(String),

    #[error("Invalid factor {0}: factors must be at least 2")]
    TooSmall(String),
}

/// Errors raised while parsing a TeslaCrypt file header.
///
/// None of these abort a scan; the classifier maps them to file categories.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("No TeslaCrypt marker at start of file")]
    BadMagic,

    #[error("Header truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Unsupported TeslaCrypt format tag 0x{0:02x}")]
    UnsupportedVersion(u8),

    #[error("Encrypted key region is corrupt: {0}")]
    CorruptKey(String),
}

/// Errors raised by the subset-product key search.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Candidate validation failed: {0}")]
    Validation(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by AES decryption.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Invalid AES key length: {0} bytes")]
    InvalidKeyLength(usize),

    #[error("Ciphertext length {0} is not a multiple of the block size")]
    UnalignedCiphertext(usize),

    #[error("Recorded size {recorded} exceeds ciphertext length {available}")]
    SizeMismatch { recorded: u64, available: usize },
}

/// Errors restoring a single file; folded into the failure counter.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Configuration problems detected before a scan starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No paths to scan")]
    NoRoots,

    #[error("Path does not exist: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("No ransomware extensions configured")]
    NoExtensions,

    #[error("Invalid key width {0}: expected 16, 24 or 32 bytes")]
    KeyWidth(usize),
}

/// Errors that abort a whole scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ScanError>;
