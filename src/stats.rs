//! Per-run counters.

use crate::classifier::Category;
use crate::header::CipherHeader;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// What the engine did with one file, beyond its category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// A previous output exists but does not match the ciphertext.
    pub bad_existing: bool,
    /// Left alone because an output already exists.
    pub skipped: bool,
    pub decrypted: bool,
    /// The decryption replaced an existing output.
    pub overwritten: bool,
    /// The encrypted original was (or in a dry run would be) removed.
    pub deleted: bool,
    pub failed: bool,
}

/// One visited file, folded into [`ScanStatistics`] and then dropped.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub header: Option<CipherHeader>,
    pub category: Category,
    pub outcome: Outcome,
}

impl FileRecord {
    pub fn new(path: PathBuf, header: Option<CipherHeader>, category: Category) -> Self {
        Self {
            path,
            header,
            category,
            outcome: Outcome::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStatistics {
    pub visited_ndirs: u64,
    pub noaccess_ndirs: u64,
    pub scanned_nfiles: u64,
    pub tesla_nfiles: u64,
    pub crypted_nfiles: u64,
    pub badheader_nfiles: u64,
    pub badexisting_nfiles: u64,
    pub unknown_nfiles: u64,
    pub skip_nfiles: u64,
    pub decrypted_nfiles: u64,
    pub overwrite_nfiles: u64,
    pub deleted_nfiles: u64,
    pub failed_nfiles: u64,
}

impl ScanStatistics {
    /// Every directory the walk reached, readable or not.
    pub fn ndirs(&self) -> u64 {
        self.visited_ndirs + self.noaccess_ndirs
    }

    pub fn record(&mut self, file: &FileRecord) {
        self.scanned_nfiles += 1;

        match file.category {
            Category::Plain => {}
            Category::Unknown => self.unknown_nfiles += 1,
            Category::BadHeader => self.badheader_nfiles += 1,
            Category::Tesla => {}
            Category::Crypted => self.crypted_nfiles += 1,
        }
        if file.category.is_tesla() {
            self.tesla_nfiles += 1;
        }

        let outcome = &file.outcome;
        self.badexisting_nfiles += u64::from(outcome.bad_existing);
        self.skip_nfiles += u64::from(outcome.skipped);
        self.decrypted_nfiles += u64::from(outcome.decrypted);
        self.overwrite_nfiles += u64::from(outcome.overwritten);
        self.deleted_nfiles += u64::from(outcome.deleted);
        self.failed_nfiles += u64::from(outcome.failed);
    }

    fn rows(&self) -> [(&'static str, u64); 14] {
        [
            ("Directories", self.ndirs()),
            ("  visited", self.visited_ndirs),
            ("  no access", self.noaccess_ndirs),
            ("Files scanned", self.scanned_nfiles),
            ("  TeslaCrypt", self.tesla_nfiles),
            ("  encrypted", self.crypted_nfiles),
            ("  bad header", self.badheader_nfiles),
            ("  unknown", self.unknown_nfiles),
            ("Bad existing", self.badexisting_nfiles),
            ("Skipped", self.skip_nfiles),
            ("Decrypted", self.decrypted_nfiles),
            ("  overwritten", self.overwrite_nfiles),
            ("Deleted", self.deleted_nfiles),
            ("Failed", self.failed_nfiles),
        ]
    }
}

impl fmt::Display for ScanStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔════════════════════════════════════════╗")?;
        writeln!(f, "║            === Statistics ===          ║")?;
        writeln!(f, "╠════════════════════════════════════════╣")?;
        for (label, value) in self.rows() {
            writeln!(f, "║ {:<18} {:>19} ║", label, value)?;
        }
        write!(f, "╚════════════════════════════════════════╝")
    }
}
