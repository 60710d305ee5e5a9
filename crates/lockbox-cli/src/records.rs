//! File records: which owner stored which file under which handle.
//!
//! The lockbox core never sees these; it only hands out and takes back
//! storage handles.

use anyhow::{Context, Result};
use lockbox_core::StorageHandle;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: u64,
    pub filename: String,
    pub storage_handle: StorageHandle,
    pub owner: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecordIndex {
    next_id: u64,
    records: Vec<FileRecord>,
}

impl RecordIndex {
    /// Load the index, or start an empty one if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read records from {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid records file {}", path.display()))
    }

    /// Write via a temporary file so a crash never leaves a truncated index.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json).context("Failed to write records")?;
        std::fs::rename(&tmp, path).context("Failed to replace records file")?;
        Ok(())
    }

    pub fn add(&mut self, owner: &str, filename: &str, storage_handle: StorageHandle) -> &FileRecord {
        self.next_id += 1;
        self.records.push(FileRecord {
            id: self.next_id,
            filename: filename.to_string(),
            storage_handle,
            owner: owner.to_string(),
        });
        &self.records[self.records.len() - 1]
    }

    /// Records are only visible to their owner.
    pub fn find(&self, id: u64, owner: &str) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.id == id && r.owner == owner)
    }

    pub fn for_owner<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a FileRecord> + 'a {
        self.records.iter().filter(move |r| r.owner == owner)
    }

    pub fn remove(&mut self, id: u64, owner: &str) -> Option<FileRecord> {
        let pos = self.records.iter().position(|r| r.id == id && r.owner == owner)?;
        Some(self.records.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_records_are_scoped_to_owner() {
        let mut index = RecordIndex::default();
        let id = index.add("alice", "notes.txt", StorageHandle::new("aa")).id;
        index.add("bob", "photo.png", StorageHandle::new("bb"));

        assert_eq!(index.find(id, "alice").map(|r| r.filename.as_str()), Some("notes.txt"));
        assert_eq!(index.find(id, "bob"), None);
        assert_eq!(index.for_owner("bob").count(), 1);

        assert!(index.remove(id, "bob").is_none());
        assert_eq!(index.remove(id, "alice").map(|r| r.storage_handle), Some(StorageHandle::new("aa")));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut index = RecordIndex::default();
        let first = index.add("alice", "a", StorageHandle::new("aa")).id;
        index.remove(first, "alice");
        let second = index.add("alice", "b", StorageHandle::new("bb")).id;
        assert_ne!(first, second);
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("records.json");
        assert_eq!(RecordIndex::load(&path)?.len(), 0);

        let mut index = RecordIndex::default();
        index.add("alice", "report.pdf", StorageHandle::new("0123abcd"));
        index.save(&path)?;

        let loaded = RecordIndex::load(&path)?;
        let record = loaded.find(1, "alice").unwrap();
        assert_eq!(record.storage_handle.as_str(), "0123abcd");
        assert!(!temp.path().join("records.json.tmp").exists());
        Ok(())
    }
}
