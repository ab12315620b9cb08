//! Per-run key resolution.
//!
//! The store is consulted, and the candidate keys enumerated, once per
//! identifier. Candidates are then checked against the first ciphertext
//! block of each file that asks until one of them confirms a key; a file
//! whose own block confirms nothing does not block its siblings.

use crate::cipher;
use crate::factors::FactorSet;
use crate::header::CipherHeader;
use crate::keystore::KeyStore;
use crate::recovery;
use crate::types::{AesKey, KeyId};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// What a run knows about one key id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Known(AesKey),
    /// Factors are stored but no candidate decrypts the file at hand.
    Unsolved,
    /// Nothing stored yet; the id is pending in the key store.
    Missing,
}

impl Resolution {
    pub fn key(&self) -> Option<&AesKey> {
        match self {
            Resolution::Known(key) => Some(key),
            _ => None,
        }
    }
}

/// Store contents for one id, loaded once per run.
enum Stored {
    Key(AesKey),
    Pending,
    Candidates(BTreeSet<AesKey>),
}

#[derive(Default)]
struct KeySlot {
    stored: OnceLock<Stored>,
    confirmed: OnceLock<AesKey>,
}

pub struct KeyResolver<'s> {
    store: &'s dyn KeyStore,
    key_width: usize,
    slots: Mutex<HashMap<KeyId, Arc<KeySlot>>>,
}

impl<'s> KeyResolver<'s> {
    pub fn new(store: &'s dyn KeyStore, key_width: usize) -> Self {
        Self {
            store,
            key_width,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The settled resolution for `id`, if any. An id whose candidates have
    /// not been confirmed by any file yet is not settled.
    pub fn cached(&self, id: &KeyId) -> Option<Resolution> {
        let slot = self.slots.lock().get(id).cloned()?;
        if let Some(key) = slot.confirmed.get() {
            return Some(Resolution::Known(key.clone()));
        }
        match slot.stored.get()? {
            Stored::Key(key) => Some(Resolution::Known(key.clone())),
            Stored::Pending => Some(Resolution::Missing),
            Stored::Candidates(_) => None,
        }
    }

    /// Resolves the key of `header`.
    ///
    /// `probe` is the first ciphertext block of the file being restored; it
    /// validates candidates while the key is not confirmed yet.
    pub fn resolve(&self, header: &CipherHeader, probe: Option<&[u8]>) -> Resolution {
        let id = header.key_id();
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(id.clone()).or_default())
        };
        if let Some(key) = slot.confirmed.get() {
            return Resolution::Known(key.clone());
        }

        let candidates = match slot.stored.get_or_init(|| self.load(header)) {
            Stored::Key(key) => return Resolution::Known(key.clone()),
            Stored::Pending => return Resolution::Missing,
            Stored::Candidates(candidates) => candidates,
        };

        let Some(key) = confirm(header, probe, candidates) else {
            return Resolution::Unsolved;
        };
        let key = slot.confirmed.get_or_init(|| {
            info!("Recovered key for {}: {}", short(id), key);
            self.store.store(id, FactorSet::default(), Some(key.clone()));
            key
        });
        Resolution::Known(key.clone())
    }

    fn load(&self, header: &CipherHeader) -> Stored {
        let id = header.key_id();

        let Some(record) = self.store.lookup(id) else {
            info!("No factors known for key {}, marked pending", short(id));
            self.store.store(id, FactorSet::default(), None);
            return Stored::Pending;
        };

        if let Some(key) = record.recovered_key {
            return Stored::Key(key);
        }
        if record.factors.is_empty() {
            debug!("Key {} is still pending", short(id));
            return Stored::Pending;
        }

        if !record.factors.reconstructs(&header.embedded_key()) {
            warn!(
                "Factors of key {} do not multiply to the header integer",
                short(id)
            );
        }

        match recovery::candidates(&record.factors, self.key_width) {
            Ok(candidates) => {
                if candidates.is_empty() {
                    warn!(
                        "None of the {} factors of key {} yield a {}-byte key",
                        record.factors.len(),
                        short(id),
                        self.key_width
                    );
                }
                debug!("{} candidate keys for {}", candidates.len(), short(id));
                Stored::Candidates(candidates)
            }
            Err(e) => {
                warn!("Key recovery for {} failed: {}", short(id), e);
                Stored::Candidates(BTreeSet::new())
            }
        }
    }
}

/// The smallest candidate whose decryption of `probe` looks like a file of
/// the expected type.
fn confirm(
    header: &CipherHeader,
    probe: Option<&[u8]>,
    candidates: &BTreeSet<AesKey>,
) -> Option<AesKey> {
    if candidates.is_empty() {
        return None;
    }
    let Some(block) = probe else {
        debug!(
            "No ciphertext to validate candidates for key {}",
            short(header.key_id())
        );
        return None;
    };

    let accepted: Vec<&AesKey> = candidates
        .iter()
        .filter(|candidate| match cipher::decrypt_prefix(header, block, candidate) {
            Ok(prefix) => cipher::looks_valid(&prefix, header.original_extension()),
            Err(e) => {
                debug!("Candidate {} rejected: {}", candidate, e);
                false
            }
        })
        .collect();

    if accepted.len() > 1 {
        warn!(
            "{} candidate keys passed validation, using the smallest",
            accepted.len()
        );
    }
    if accepted.is_empty() {
        warn!(
            "None of the {} candidate keys of {} decrypt this file",
            candidates.len(),
            short(header.key_id())
        );
    }
    accepted.first().map(|key| (*key).clone())
}

/// Ids are 128 hex digits; logs only need the start.
fn short(id: &KeyId) -> &str {
    let text = id.as_str();
    text.get(..16).unwrap_or(text)
}
