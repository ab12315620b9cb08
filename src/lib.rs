//! Recovers TeslaCrypt AES keys from factors of the integer stored in every
//! encrypted file's header, and restores encrypted files in bulk.

pub mod cipher;
pub mod classifier;
pub mod error;
pub mod factors;
pub mod header;
pub mod keystore;
pub mod recovery;
pub mod scan;
pub mod signatures;
pub mod stats;
pub mod types;

pub use classifier::{Category, Classification, FileClassifier};
pub use error::{CipherError, ConfigError, FactorError, HeaderError, RecoveryError, ScanError};
pub use factors::FactorSet;
pub use header::{CipherHeader, FormatVersion, HEADER_LEN};
pub use keystore::{KeyRecord, KeyStore, MemoryKeyStore};
pub use scan::{scan, ScanOptions, Scanner};
pub use stats::{FileRecord, Outcome, ScanStatistics};
pub use types::{AesKey, KeyId};
