//! The key-database contract.
//!
//! The scan engine never computes factors itself; it asks a [`KeyStore`] for
//! what is known about an identifier and writes back keys it recovers.
//! Persistence is up to the implementor.

use crate::factors::FactorSet;
use crate::types::{AesKey, KeyId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything known about one per-installation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub id: KeyId,
    #[serde(default)]
    pub factors: FactorSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered_key: Option<AesKey>,
}

impl KeyRecord {
    pub fn new(id: KeyId) -> Self {
        Self {
            name: None,
            id,
            factors: FactorSet::default(),
            recovered_key: None,
        }
    }

    pub fn with_factors(mut self, factors: FactorSet) -> Self {
        self.factors = factors;
        self
    }

    pub fn with_key(mut self, key: AesKey) -> Self {
        self.recovered_key = Some(key);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Seen in encrypted files but nothing to recover the key from yet.
    pub fn is_pending(&self) -> bool {
        self.factors.is_empty() && self.recovered_key.is_none()
    }

    fn merge(&mut self, factors: FactorSet, recovered_key: Option<AesKey>) {
        if !factors.is_empty() {
            self.factors = factors;
        }
        if recovered_key.is_some() {
            self.recovered_key = recovered_key;
        }
    }
}

/// Lookup and write-back contract of the key database.
///
/// Implementations must be safe to call from several solver threads.
pub trait KeyStore: Send + Sync {
    fn lookup(&self, id: &KeyId) -> Option<KeyRecord>;

    /// Creates or updates a record. Empty factors and a missing key never
    /// erase what is already stored.
    fn store(&self, id: &KeyId, factors: FactorSet, recovered_key: Option<AesKey>);
}

/// In-memory key database.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: RwLock<BTreeMap<KeyId, KeyRecord>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = KeyRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Inserts or replaces a whole record.
    pub fn insert(&self, record: KeyRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    pub fn records(&self) -> Vec<KeyRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Identifiers seen during scans for which nothing is known yet.
    pub fn pending(&self) -> Vec<KeyId> {
        self.records
            .read()
            .values()
            .filter(|r| r.is_pending())
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl KeyStore for MemoryKeyStore {
    fn lookup(&self, id: &KeyId) -> Option<KeyRecord> {
        self.records.read().get(id).cloned()
    }

    fn store(&self, id: &KeyId, factors: FactorSet, recovered_key: Option<AesKey>) {
        self.records
            .write()
            .entry(id.clone())
            .or_insert_with(|| KeyRecord::new(id.clone()))
            .merge(factors, recovered_key);
    }
}
