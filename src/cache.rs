//! Raw Cache: content store for downloaded source files, keyed by a
//! monotonically assigned id that survives job lifetime.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CacheId;
use crate::sync_ext::MutexExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOrigin {
    Downloaded,
    ManualDrop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub added: DateTime<Utc>,
    #[serde(default)]
    pub origin: Option<CacheOrigin>,
}

/// JSON-registry-backed cache.
pub struct RawCache {
    registry_path: PathBuf,
    manual_drop_dir: PathBuf,
    entries: Mutex<BTreeMap<CacheId, CacheEntry>>,
}

impl RawCache {
    pub fn load(registry_path: PathBuf, manual_drop_dir: PathBuf) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(&registry_path).unwrap_or_else(|_| "{}".to_string());
        let loaded: BTreeMap<CacheId, CacheEntry> = serde_json::from_str(&raw).unwrap_or_default();
        let pruned: BTreeMap<CacheId, CacheEntry> = loaded
        .into_iter()
        .filter(|(_, entry)| entry.path.exists())
        .collect();
        let cache = Self {
            registry_path,
            manual_drop_dir,
            entries: Mutex::new(pruned),
        };
        cache.persist()?;
        Ok(cache)
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(dir) = self.registry_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let entries = self.entries.lock_unpoisoned();
        let raw = serde_json::to_string_pretty(&*entries)?;
        std::fs::write(&self.registry_path, raw)?;
        Ok(())
    }

    /// `add(path, display_name) -> id` assigns `max(existing ids) + 1`.
    pub fn add(&self, path: PathBuf, display_name: &str, origin: CacheOrigin) -> anyhow::Result<CacheId> {
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let mut entries = self.entries.lock_unpoisoned();
        let next = entries.keys().map(|id| id.0).max().map_or(0, |m| m + 1);
        let id = CacheId(next);
        entries.insert(
            id,
            CacheEntry {
                path,
                name: display_name.to_string(),
                size,
                added: Utc::now(),
                origin: Some(origin),
            },
        );
        drop(entries);
        self.persist()?;
        Ok(id)
    }

    pub fn get(&self, id: CacheId) -> Option<CacheEntry> {
        self.entries.lock_unpoisoned().get(&id).cloned()
    }

    pub fn list(&self) -> Vec<(CacheId, CacheEntry)> {
        self.entries
        .lock_unpoisoned()
        .iter()
        .map(|(id, entry)| (*id, entry.clone()))
        .collect()
    }

    /// Scans the manual-drop folder and adopts any video file not already
    /// tracked, assigning it a new id with origin `ManualDrop`.
    /// Adding the same path twice is idempotent: an already-adopted path is
    /// skipped.
    pub fn adopt_manual_drops(&self, is_video_file: impl Fn(&Path) -> bool) -> anyhow::Result<Vec<CacheId>> {
        let Ok(read_dir) = std::fs::read_dir(&self.manual_drop_dir) else {
            return Ok(Vec::new());
        };
        let already_known: std::collections::HashSet<PathBuf> = self
        .entries
        .lock_unpoisoned()
        .values()
        .map(|e| e.path.clone())
        .collect();

        let mut adopted = Vec::new();
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if !path.is_file() || !is_video_file(&path) || already_known.contains(&path) {
                continue;
            }
            let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
            adopted.push(self.add(path, &name, CacheOrigin::ManualDrop)?);
        }
        Ok(adopted)
    }

    /// Deletes all entries and their backing files.
    pub fn clear(&self) -> anyhow::Result<()> {
        let mut entries = self.entries.lock_unpoisoned();
        for entry in entries.values() {
            let _ = std::fs::remove_file(&entry.path);
        }
        entries.clear();
        drop(entries);
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_in(dir: &tempfile::TempDir) -> RawCache {
        RawCache::load(
            dir.path().join("registry.json"),
            dir.path().join("manual_drop"),
        )
        .unwrap()
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let f1 = dir.path().join("a.mp4");
        let f2 = dir.path().join("b.mp4");
        std::fs::write(&f1, b"a").unwrap();
        std::fs::write(&f2, b"b").unwrap();

        let id1 = cache.add(f1, "a.mp4", CacheOrigin::Downloaded).unwrap();
        let id2 = cache.add(f2, "b.mp4", CacheOrigin::Downloaded).unwrap();
        assert_eq!(id1.0 + 1, id2.0);
    }

    #[test]
    fn load_prunes_entries_whose_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.mp4");
        std::fs::write(&file, b"x").unwrap();
        let registry_path = dir.path().join("registry.json");
        {
            let cache = RawCache::load(registry_path.clone(), dir.path().join("manual_drop")).unwrap();
            cache.add(file.clone(), "gone.mp4", CacheOrigin::Downloaded).unwrap();
        }
        std::fs::remove_file(&file).unwrap();

        let reloaded = RawCache::load(registry_path, dir.path().join("manual_drop")).unwrap();
        assert!(reloaded.list().is_empty());
    }

    #[test]
    fn adopting_the_same_manual_drop_file_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manual_drop = dir.path().join("manual_drop");
        std::fs::create_dir_all(&manual_drop).unwrap();
        let file = manual_drop.join("clip.mp4");
        std::fs::write(&file, b"x").unwrap();

        let cache = cache_in(&dir);
        let first = cache.adopt_manual_drops(|_| true).unwrap();
        let second = cache.adopt_manual_drops(|_| true).unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(cache.list().len(), 1);
    }

    #[test]
    fn clear_removes_entries_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let file = dir.path().join("a.mp4");
        std::fs::write(&file, b"a").unwrap();
        cache.add(file.clone(), "a.mp4", CacheOrigin::Downloaded).unwrap();

        cache.clear().unwrap();
        assert!(cache.list().is_empty());
        assert!(!file.exists());
    }
}
