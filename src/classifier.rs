//! Assigns every scanned file to a category.
//!
//! The cheap filename check runs first; only files carrying a ransomware
//! extension are opened and their header parsed.

use crate::error::HeaderError;
use crate::header::{CipherHeader, HEADER_LEN};
use crate::types::BLOCK_LEN;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Extensions TeslaCrypt appends to encrypted files.
pub const DEFAULT_EXTENSIONS: [&str; 12] = [
    "vvv", "ccc", "zzz", "xyz", "aaa", "abc", "ttt", "xxx", "ecc", "exx", "ezz", "micro",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// No ransomware extension; never opened.
    Plain,
    /// Ransomware extension but no TeslaCrypt marker.
    Unknown,
    /// Marker present but the header could not be parsed.
    BadHeader,
    /// Valid header with no ciphertext after it.
    Tesla,
    /// Valid header followed by ciphertext.
    Crypted,
}

impl Category {
    /// Counted under `tesla_nfiles`.
    pub fn is_tesla(&self) -> bool {
        matches!(self, Category::Tesla | Category::Crypted | Category::BadHeader)
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub path: PathBuf,
    pub category: Category,
    pub header: Option<CipherHeader>,
    pub header_error: Option<HeaderError>,
    /// Where the decrypted file goes.
    pub output_path: Option<PathBuf>,
    /// First ciphertext block, used to validate candidate keys.
    pub probe: Option<[u8; BLOCK_LEN]>,
}

#[derive(Debug, Clone)]
pub struct FileClassifier {
    extensions: Vec<String>,
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

impl FileClassifier {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Whether the file name ends in a known ransomware extension.
    pub fn has_ransom_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(e)))
    }

    /// The sibling path with the ransomware extension removed.
    pub fn output_path(&self, path: &Path) -> Option<PathBuf> {
        if !self.has_ransom_extension(path) {
            return None;
        }
        let stem = path.file_stem()?;
        Some(path.with_file_name(stem))
    }

    /// Reads the start of `path` and classifies it.
    pub fn classify(&self, path: &Path) -> io::Result<Classification> {
        if !self.has_ransom_extension(path) {
            return Ok(self.classify_bytes(path, &[]));
        }

        let mut data = Vec::with_capacity(HEADER_LEN + BLOCK_LEN);
        File::open(path)?
            .take((HEADER_LEN + BLOCK_LEN) as u64)
            .read_to_end(&mut data)?;
        Ok(self.classify_bytes(path, &data))
    }

    /// Classifies from the first bytes of a file (at least header plus one
    /// block when available).
    pub fn classify_bytes(&self, path: &Path, data: &[u8]) -> Classification {
        let mut result = Classification {
            path: path.to_path_buf(),
            category: Category::Plain,
            header: None,
            header_error: None,
            output_path: None,
            probe: None,
        };

        if !self.has_ransom_extension(path) {
            return result;
        }
        result.output_path = self.output_path(path);

        let original_extension = result
            .output_path
            .as_deref()
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match CipherHeader::parse(data) {
            Ok(header) => {
                result.category = if data.len() > HEADER_LEN {
                    Category::Crypted
                } else {
                    Category::Tesla
                };
                if let Some(block) = data.get(HEADER_LEN..HEADER_LEN + BLOCK_LEN) {
                    let mut probe = [0u8; BLOCK_LEN];
                    probe.copy_from_slice(block);
                    result.probe = Some(probe);
                }
                result.header = Some(header.with_original_extension(original_extension));
            }
            Err(HeaderError::BadMagic) => {
                result.category = Category::Unknown;
                result.header_error = Some(HeaderError::BadMagic);
            }
            Err(e) => {
                result.category = Category::BadHeader;
                result.header_error = Some(e);
            }
        }

        result
    }
}
