//! `AppMetadata` — process-wide opaque key/value store for caches, secrets,
//! and notification settings (SPEC_FULL.md §3).

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use uuid::Uuid;

use clm_domain::model::METADATA_KEY_SIGNING_KEY;
use clm_domain::{Error, Result};

pub struct MetadataStore {
    path: PathBuf,
    rows: RwLock<HashMap<String, serde_json::Value>>,
}

impl MetadataStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rows = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw).unwrap_or_default()
            }
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            rows: RwLock::new(rows),
        })
    }

    /// Reads return the latest committed value.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.rows.read().get(key).cloned()
    }

    /// Whole-value last-writer-wins write; callers needing atomicity write
    /// the entire value as one call (SPEC_FULL.md §5).
    pub fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.rows.write().insert(key.to_string(), value);
        self.persist()
    }

    /// Narrow "maybe-create" primitive, safe against concurrent first
    /// callers: holds the write lock across the whole check-then-set.
    pub fn get_or_create_signing_key(&self) -> Result<Vec<u8>> {
        {
            let rows = self.rows.read();
            if let Some(v) = rows.get(METADATA_KEY_SIGNING_KEY) {
                if let Some(s) = v.as_str() {
                    if let Ok(bytes) = hex::decode(s) {
                        return Ok(bytes);
                    }
                }
            }
        }
        let mut rows = self.rows.write();
        if let Some(v) = rows.get(METADATA_KEY_SIGNING_KEY) {
            if let Some(s) = v.as_str() {
                if let Ok(bytes) = hex::decode(s) {
                    return Ok(bytes);
                }
            }
        }
        // No CSPRNG crate exists anywhere in this workspace's dependency
        // lineage; two v4 UUIDs (itself backed by `getrandom`) concatenated
        // give 32 bytes of randomness without introducing a new crate.
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        rows.insert(
            METADATA_KEY_SIGNING_KEY.to_string(),
            serde_json::Value::String(hex::encode(&key)),
        );
        drop(rows);
        self.persist()?;
        Ok(key)
    }

    fn persist(&self) -> Result<()> {
        let rows = self.rows.read();
        let json = serde_json::to_string_pretty(&*rows)?;
        drop(rows);
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path).map_err(Error::Io)?;
        Ok(())
    }
}
