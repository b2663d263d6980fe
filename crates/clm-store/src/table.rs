//! Generic JSON-file-backed table of `Uuid`-keyed rows.
//!
//! Grounded on the teacher's `RunStore`/`ScheduleStore` persistence idiom
//! (load-whole-file-at-startup, atomic tmp-then-rename rewrite on every
//! mutation) generalized to any serializable row type, since no SQL crate
//! exists anywhere in this workspace's dependency lineage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use clm_domain::{Error, Result};

pub struct Table<T> {
    path: PathBuf,
    rows: RwLock<HashMap<Uuid, T>>,
}

impl<T> Table<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
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
        tracing::debug!(path = %path.display(), rows = rows.len(), "table loaded");
        Ok(Self {
            path,
            rows: RwLock::new(rows),
        })
    }

    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.rows.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.rows.read().values().cloned().collect()
    }

    pub fn insert(&self, id: Uuid, row: T) -> Result<()> {
        self.rows.write().insert(id, row);
        self.persist()
    }

    /// Mutate a row in place and persist iff a row was found.
    pub fn update<F>(&self, id: &Uuid, f: F) -> Result<bool>
    where
        F: FnOnce(&mut T),
    {
        let found = {
            let mut rows = self.rows.write();
            match rows.get_mut(id) {
                Some(row) => {
                    f(row);
                    true
                }
                None => false,
            }
        };
        if found {
            self.persist()?;
        }
        Ok(found)
    }

    pub fn remove(&self, id: &Uuid) -> Result<Option<T>> {
        let removed = self.rows.write().remove(id);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn retain<F>(&self, mut keep: F) -> Result<()>
    where
        F: FnMut(&Uuid, &T) -> bool,
    {
        self.rows.write().retain(|k, v| keep(k, v));
        self.persist()
    }

    /// Atomic write: serialize the whole table to a sibling `.tmp` file,
    /// then rename over the real path — a crash mid-write never corrupts
    /// the on-disk copy.
    fn persist(&self) -> Result<()> {
        let rows = self.rows.read();
        let json = serde_json::to_string_pretty(&*rows)?;
        drop(rows);
        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path).map_err(Error::Io)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Row {
        name: String,
        count: u32,
    }

    fn row(name: &str, count: u32) -> Row {
        Row {
            name: name.into(),
            count,
        }
    }

    #[test]
    fn insert_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let table: Table<Row> = Table::open(dir.path().join("rows.json")).unwrap();
        let id = Uuid::new_v4();
        table.insert(id, row("a", 1)).unwrap();
        assert_eq!(table.get(&id), Some(row("a", 1)));
    }

    #[test]
    fn reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        let id = Uuid::new_v4();
        {
            let table: Table<Row> = Table::open(&path).unwrap();
            table.insert(id, row("a", 1)).unwrap();
        }
        let table: Table<Row> = Table::open(&path).unwrap();
        assert_eq!(table.get(&id), Some(row("a", 1)));
    }

    #[test]
    fn update_mutates_existing_row() {
        let dir = tempfile::tempdir().unwrap();
        let table: Table<Row> = Table::open(dir.path().join("rows.json")).unwrap();
        let id = Uuid::new_v4();
        table.insert(id, row("a", 1)).unwrap();
        let found = table.update(&id, |r| r.count += 1).unwrap();
        assert!(found);
        assert_eq!(table.get(&id).unwrap().count, 2);
    }

    #[test]
    fn update_missing_row_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let table: Table<Row> = Table::open(dir.path().join("rows.json")).unwrap();
        let found = table.update(&Uuid::new_v4(), |r| r.count += 1).unwrap();
        assert!(!found);
    }

    #[test]
    fn remove_deletes_row() {
        let dir = tempfile::tempdir().unwrap();
        let table: Table<Row> = Table::open(dir.path().join("rows.json")).unwrap();
        let id = Uuid::new_v4();
        table.insert(id, row("a", 1)).unwrap();
        let removed = table.remove(&id).unwrap();
        assert_eq!(removed, Some(row("a", 1)));
        assert_eq!(table.get(&id), None);
    }

    #[test]
    fn retain_filters_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table: Table<Row> = Table::open(dir.path().join("rows.json")).unwrap();
        let keep_id = Uuid::new_v4();
        let drop_id = Uuid::new_v4();
        table.insert(keep_id, row("keep", 1)).unwrap();
        table.insert(drop_id, row("drop", 2)).unwrap();
        table.retain(|_, r| r.name == "keep").unwrap();
        assert_eq!(table.list().len(), 1);
        assert_eq!(table.get(&keep_id).unwrap().name, "keep");
    }

    #[test]
    fn empty_file_loads_as_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, "").unwrap();
        let table: Table<Row> = Table::open(&path).unwrap();
        assert!(table.list().is_empty());
    }
}
