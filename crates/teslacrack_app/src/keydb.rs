//! JSON persistence for the key database.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use teslacrack::{KeyRecord, MemoryKeyStore};

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyDbFile {
    #[serde(default)]
    keys: Vec<KeyRecord>,
}

/// A [`MemoryKeyStore`] loaded from and saved to a JSON file.
pub struct KeyDatabase {
    path: PathBuf,
    store: MemoryKeyStore,
}

impl KeyDatabase {
    /// Loads `path`; a missing file is an empty database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<KeyDbFile>(&text)
                .with_context(|| format!("Invalid key database {}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => KeyDbFile::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read key database {}", path.display()));
            }
        };

        tracing::debug!("Loaded {} key records from {}", file.keys.len(), path.display());
        Ok(Self {
            path,
            store: MemoryKeyStore::from_records(file.keys),
        })
    }

    pub fn store(&self) -> &MemoryKeyStore {
        &self.store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the database through a temporary sibling file.
    pub fn save(&self) -> Result<()> {
        let file = KeyDbFile {
            keys: self.store.records(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize key database")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json + "\n")
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        tracing::debug!("Saved {} key records to {}", file.keys.len(), self.path.display());
        Ok(())
    }
}
