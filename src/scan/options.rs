//! Scan options

use crate::classifier::DEFAULT_EXTENSIONS;
use crate::error::ConfigError;
use crate::types::DEFAULT_KEY_WIDTH;
use std::path::PathBuf;

/// Options for a restore run
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Files or directories to scan
    pub roots: Vec<PathBuf>,
    /// Decide and count everything, touch nothing
    pub dry_run: bool,
    /// Re-decrypt files whose existing output is bad
    pub fix: bool,
    /// Re-decrypt even when an output already exists
    pub overwrite: bool,
    /// Remove the encrypted original after decrypting it
    pub delete: bool,
    /// Also remove originals whose good output already exists
    pub delete_old: bool,
    /// Log every per-file decision
    pub verbose: bool,
    /// Report progress to the registered callback
    pub progress: bool,
    /// Extensions the ransomware appends (without the dot)
    pub extensions: Vec<String>,
    /// Target key width in bytes
    pub key_width: usize,
    /// Solve distinct key ids of a directory concurrently
    pub parallel: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            dry_run: false,
            fix: false,
            overwrite: false,
            delete: false,
            delete_old: false,
            verbose: false,
            progress: false,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            key_width: DEFAULT_KEY_WIDTH,
            parallel: true,
        }
    }
}

impl ScanOptions {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_fix(mut self, fix: bool) -> Self {
        self.fix = fix;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn with_delete_old(mut self, delete_old: bool) -> Self {
        self.delete_old = delete_old;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_key_width(mut self, key_width: usize) -> Self {
        self.key_width = key_width;
        self
    }

    /// Solves key ids one at a time
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Whether originals are removed after a successful decryption.
    pub fn deletes_decrypted(&self) -> bool {
        self.delete || self.delete_old
    }

    /// Checks the options before any filesystem traversal
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }
        if let Some(missing) = self.roots.iter().find(|root| !root.exists()) {
            return Err(ConfigError::MissingRoot(missing.clone()));
        }
        if self.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return Err(ConfigError::NoExtensions);
        }
        match self.key_width {
            16 | 24 | 32 => Ok(()),
            width => Err(ConfigError::KeyWidth(width)),
        }
    }
}
