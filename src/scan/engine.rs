//! Directory walk and per-file restore decisions.

use super::options::ScanOptions;
use super::resolver::{KeyResolver, Resolution};
use crate::cipher;
use crate::classifier::{Category, Classification, FileClassifier};
use crate::error::{FileError, ScanError};
use crate::header::{CipherHeader, HEADER_LEN};
use crate::keystore::KeyStore;
use crate::stats::{FileRecord, ScanStatistics};
use crate::types::{AesKey, KeyId, BLOCK_LEN};
use rayon::prelude::*;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Snapshot handed to the progress callback after every file.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub dirs_seen: u64,
    pub files_seen: u64,
    pub current: PathBuf,
}

/// Progress callback for a scan
pub type ProgressCallback = Box<dyn Fn(&ScanProgress) + Send + Sync>;

/// Walks the roots and restores every encrypted file it can.
pub struct Scanner<'a> {
    options: &'a ScanOptions,
    classifier: FileClassifier,
    resolver: KeyResolver<'a>,
    stats: ScanStatistics,
    progress: Option<ProgressCallback>,
    running: Option<Arc<AtomicBool>>,
}

impl<'a> Scanner<'a> {
    pub fn new(options: &'a ScanOptions, store: &'a dyn KeyStore) -> Result<Self, ScanError> {
        options.validate()?;
        Ok(Self {
            options,
            classifier: FileClassifier::new(&options.extensions),
            resolver: KeyResolver::new(store, options.key_width),
            stats: ScanStatistics::default(),
            progress: None,
            running: None,
        })
    }

    /// Called after every file when `options.progress` is set.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Stops scheduling directories once the flag turns false.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    pub fn run(mut self) -> Result<ScanStatistics, ScanError> {
        let start_time = Instant::now();
        info!(
            "Starting scan of {} root(s){}",
            self.options.roots.len(),
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let mut pending_dirs = Vec::new();
        for root in &self.options.roots {
            let metadata = fs::metadata(root).map_err(|source| ScanError::Io {
                path: root.clone(),
                source,
            })?;
            if metadata.is_dir() {
                pending_dirs.push(root.clone());
            } else {
                self.process_batch(vec![root.clone()]);
            }
        }
        // Pop roots in the order given.
        pending_dirs.reverse();

        while let Some(dir) = pending_dirs.pop() {
            if !self.is_running() {
                warn!("Scan interrupted, {} directories left", pending_dirs.len() + 1);
                break;
            }

            let (mut subdirs, files) = match read_directory(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Cannot read directory {}: {}", dir.display(), e);
                    self.stats.noaccess_ndirs += 1;
                    continue;
                }
            };
            self.stats.visited_ndirs += 1;

            subdirs.reverse();
            pending_dirs.extend(subdirs);
            self.process_batch(files);
        }

        info!(
            "Scan complete: {} decrypted, {} failed, {} skipped in {:.2}s",
            self.stats.decrypted_nfiles,
            self.stats.failed_nfiles,
            self.stats.skip_nfiles,
            start_time.elapsed().as_secs_f64()
        );

        Ok(self.stats)
    }

    fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_none_or(|running| running.load(Ordering::SeqCst))
    }

    /// Classifies a directory's files, solves their keys, then restores them.
    fn process_batch(&mut self, files: Vec<PathBuf>) {
        let mut classified = Vec::with_capacity(files.len());
        for path in files {
            match self.classifier.classify(&path) {
                Ok(c) => classified.push(c),
                Err(e) => {
                    warn!("Cannot read {}: {}", path.display(), e);
                    let mut record = FileRecord::new(path, None, Category::Plain);
                    record.outcome.failed = true;
                    self.finish(record);
                }
            }
        }

        self.solve_keys(&classified);

        for c in classified {
            let record = self.process_file(c);
            self.finish(record);
        }
    }

    fn solve_keys(&self, classified: &[Classification]) {
        let mut groups: Vec<Vec<(&CipherHeader, Option<&[u8]>)>> = Vec::new();
        let mut index: HashMap<&KeyId, usize> = HashMap::new();
        for c in classified.iter().filter(|c| c.category == Category::Crypted) {
            let Some(header) = &c.header else {
                continue;
            };
            if self.resolver.cached(header.key_id()).is_some() {
                continue;
            }
            let i = *index.entry(header.key_id()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[i].push((header, c.probe.as_ref().map(|p| &p[..])));
        }

        if groups.is_empty() {
            return;
        }
        debug!("Solving {} key id(s)", groups.len());

        // Files with ciphertext to validate against go first.
        for group in &mut groups {
            group.sort_by_key(|(_, probe)| probe.is_none());
        }

        let resolver = &self.resolver;
        if self.options.parallel && groups.len() > 1 {
            groups.par_iter().for_each(|group| solve_group(resolver, group));
        } else {
            for group in &groups {
                solve_group(resolver, group);
            }
        }
    }

    fn finish(&mut self, record: FileRecord) {
        self.stats.record(&record);

        if self.options.progress {
            if let Some(callback) = &self.progress {
                callback(&ScanProgress {
                    dirs_seen: self.stats.ndirs(),
                    files_seen: self.stats.scanned_nfiles,
                    current: record.path,
                });
            }
        }
    }

    fn process_file(&self, c: Classification) -> FileRecord {
        let mut record = FileRecord::new(c.path, c.header, c.category);

        let (Category::Crypted, Some(header), Some(output)) =
            (c.category, record.header.clone(), c.output_path)
        else {
            match c.category {
                Category::Plain => {}
                Category::Unknown => debug!("{}: not a TeslaCrypt file", record.path.display()),
                Category::BadHeader => warn!(
                    "{}: bad header: {}",
                    record.path.display(),
                    c.header_error.map(|e| e.to_string()).unwrap_or_default()
                ),
                _ => debug!("{}: no encrypted content", record.path.display()),
            }
            return record;
        };
        let probe = c.probe.as_ref().map(|p| &p[..]);

        let mut overwriting = false;
        if output.exists() {
            if !self.options.overwrite {
                let bad = match self.resolver.resolve(&header, probe) {
                    Resolution::Known(key) => existing_is_bad(&output, &header, probe, &key),
                    _ => false,
                };
                if bad {
                    warn!("{}: existing output is bad", output.display());
                    record.outcome.bad_existing = true;
                }

                if !(bad && self.options.fix) {
                    debug!("{}: already decrypted", record.path.display());
                    record.outcome.skipped = true;
                    if self.options.delete_old {
                        self.delete_original(&mut record);
                    }
                    return record;
                }
            }
            overwriting = true;
        }

        let key = match self.resolver.resolve(&header, probe) {
            Resolution::Known(key) => key,
            Resolution::Missing => {
                debug!(
                    "{}: key {} pending factorization",
                    record.path.display(),
                    header.key_id()
                );
                return record;
            }
            Resolution::Unsolved => {
                warn!("{}: no usable key", record.path.display());
                record.outcome.failed = true;
                return record;
            }
        };

        let plain = match decrypt_file(&record.path, &header, &key) {
            Ok(plain) => plain,
            Err(e) => {
                warn!("{}: decryption failed: {}", record.path.display(), e);
                record.outcome.failed = true;
                return record;
            }
        };

        if !self.options.dry_run {
            if let Err(e) = write_output(&output, &plain) {
                warn!("{}: cannot write output: {}", output.display(), e);
                record.outcome.failed = true;
                return record;
            }
        }
        info!(
            "{}{} {}",
            if self.options.dry_run { "[dry run] " } else { "" },
            if overwriting { "Re-decrypted" } else { "Decrypted" },
            output.display()
        );
        record.outcome.decrypted = true;
        record.outcome.overwritten = overwriting;

        if self.options.deletes_decrypted() {
            self.delete_original(&mut record);
        }
        record
    }

    fn delete_original(&self, record: &mut FileRecord) {
        if self.options.dry_run {
            record.outcome.deleted = true;
            return;
        }
        match fs::remove_file(&record.path) {
            Ok(()) => {
                info!("Deleted {}", record.path.display());
                record.outcome.deleted = true;
            }
            Err(e) => warn!("Cannot delete {}: {}", record.path.display(), e),
        }
    }
}

/// Runs a scan with default settings.
pub fn scan(options: &ScanOptions, store: &dyn KeyStore) -> Result<ScanStatistics, ScanError> {
    Scanner::new(options, store)?.run()
}

/// Subdirectories and regular files of `dir`, sorted by name. Symlinks are
/// not followed.
fn read_directory(dir: &Path) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut subdirs = Vec::new();
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cannot read entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => subdirs.push(entry.path()),
            Ok(ft) if ft.is_file() => files.push(entry.path()),
            Ok(_) => debug!("Skipping {}", entry.path().display()),
            Err(e) => warn!("Cannot stat {}: {}", entry.path().display(), e),
        }
    }

    subdirs.sort();
    files.sort();
    Ok((subdirs, files))
}

/// Tries the files of one id in turn until the key is settled.
fn solve_group(resolver: &KeyResolver<'_>, group: &[(&CipherHeader, Option<&[u8]>)]) {
    for (header, probe) in group {
        if resolver.resolve(header, *probe) != Resolution::Unsolved {
            break;
        }
    }
}

fn decrypt_file(path: &Path, header: &CipherHeader, key: &AesKey) -> Result<Vec<u8>, FileError> {
    let data = fs::read(path)?;
    let body = data.get(HEADER_LEN..).unwrap_or_default();
    Ok(cipher::decrypt_body(header, body, key)?)
}

/// An existing output is bad when its size or first block disagree with
/// what the ciphertext decrypts to.
fn existing_is_bad(
    output: &Path,
    header: &CipherHeader,
    probe: Option<&[u8]>,
    key: &AesKey,
) -> bool {
    let Ok(metadata) = fs::metadata(output) else {
        return false;
    };
    if metadata.len() != u64::from(header.original_size()) {
        return true;
    }

    let Some(expected) = probe.and_then(|p| cipher::decrypt_prefix(header, p, key).ok()) else {
        return false;
    };
    let mut actual = Vec::with_capacity(BLOCK_LEN);
    let read = File::open(output)
        .and_then(|f| f.take(expected.len() as u64).read_to_end(&mut actual));
    match read {
        Ok(_) => actual != expected,
        Err(e) => {
            warn!("Cannot read {}: {}", output.display(), e);
            false
        }
    }
}

/// Writes `data` to a sibling temporary file and renames it over `path`, so
/// an existing output survives a failed write.
fn write_output(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    let tmp = path.with_file_name(name);

    let written = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));
    if written.is_err() && tmp.is_file() {
        if let Err(e) = fs::remove_file(&tmp) {
            debug!("Cannot remove {}: {}", tmp.display(), e);
        }
    }
    written
}
