//! # Subscriber Registry
//!
//! The set of destinations that opted in to push notifications. The registry
//! is the only mutator of the set; persistence goes through an injected
//! [`SubscriberStore`], which is written after every add/remove and read on
//! startup and on explicit reload.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;

/// Load/save collaborator for the persisted subscriber list.
pub trait SubscriberStore: Send + Sync {
    fn load(&self) -> Result<BTreeSet<String>, StoreError>;
    fn save(&self, subscribers: &BTreeSet<String>) -> Result<(), StoreError>;
}

/// Stores subscribers as a JSON array of strings.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SubscriberStore for JsonFileStore {
    /// A missing file is an empty list. Duplicates collapse.
    fn load(&self) -> Result<BTreeSet<String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        let list: Vec<String> = serde_json::from_str(&raw)?;
        Ok(list.into_iter().collect())
    }

    /// Writes to a sibling temp file, then renames over the target.
    fn save(&self, subscribers: &BTreeSet<String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let list: Vec<&String> = subscribers.iter().collect();
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string(&list)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

pub struct SubscriberRegistry {
    subscribers: Mutex<BTreeSet<String>>,
    store: Box<dyn SubscriberStore>,
}

impl SubscriberRegistry {
    /// Builds a registry seeded from `store`. A load failure is logged and
    /// leaves the registry empty.
    pub fn new(store: Box<dyn SubscriberStore>) -> Self {
        let initial = store.load().unwrap_or_else(|e| {
            log::error!("Failed to load subscribers: {}", e);
            BTreeSet::new()
        });
        log::info!("Loaded {} subscriber(s)", initial.len());
        Self {
            subscribers: Mutex::new(initial),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `id`. Returns `false` if it was already subscribed.
    pub fn subscribe(&self, id: &str) -> bool {
        let mut subs = self.lock();
        if !subs.insert(id.to_string()) {
            return false;
        }
        self.persist(&subs);
        log::info!("New subscriber: {}", id);
        true
    }

    /// Removes `id`. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut subs = self.lock();
        if !subs.remove(id) {
            return false;
        }
        self.persist(&subs);
        log::info!("Subscriber removed: {}", id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    /// Point-in-time copy used by fan-out.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Replaces the in-memory set with the persisted one. On failure the
    /// current set is kept.
    pub fn reload(&self) -> Result<usize, StoreError> {
        let loaded = self.store.load()?;
        let mut subs = self.lock();
        *subs = loaded;
        log::info!("Reloaded {} subscriber(s)", subs.len());
        Ok(subs.len())
    }

    fn persist(&self, subs: &BTreeSet<String>) {
        if let Err(e) = self.store.save(subs) {
            log::error!("Failed to save subscribers: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// In-memory store whose contents the test can inspect and rewrite.
    #[derive(Clone, Default)]
    struct MemoryStore {
        data: Arc<Mutex<BTreeSet<String>>>,
        saves: Arc<Mutex<usize>>,
    }

    impl SubscriberStore for MemoryStore {
        fn load(&self) -> Result<BTreeSet<String>, StoreError> {
            Ok(self.data.lock().unwrap().clone())
        }

        fn save(&self, subscribers: &BTreeSet<String>) -> Result<(), StoreError> {
            *self.data.lock().unwrap() = subscribers.clone();
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn subscribe_is_set_like() {
        let store = MemoryStore::default();
        let registry = SubscriberRegistry::new(Box::new(store.clone()));

        assert!(registry.subscribe("group:1"));
        assert!(!registry.subscribe("group:1"));
        assert_eq!(registry.len(), 1);
        assert_eq!(*store.saves.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribe_only_saves_on_change() {
        let store = MemoryStore::default();
        let registry = SubscriberRegistry::new(Box::new(store.clone()));
        registry.subscribe("a");

        assert!(!registry.unsubscribe("b"));
        assert!(registry.unsubscribe("a"));
        assert!(!registry.contains("a"));
        assert_eq!(*store.saves.lock().unwrap(), 2);
        assert!(store.data.lock().unwrap().is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let registry = SubscriberRegistry::new(Box::new(MemoryStore::default()));
        registry.subscribe("a");
        registry.subscribe("b");

        let snap = registry.snapshot();
        registry.unsubscribe("a");
        registry.subscribe("c");
        assert_eq!(snap, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn reload_overwrites_memory() {
        let store = MemoryStore::default();
        let registry = SubscriberRegistry::new(Box::new(store.clone()));
        registry.subscribe("a");

        *store.data.lock().unwrap() = ["x".to_string(), "y".to_string()].into_iter().collect();
        assert_eq!(registry.reload().unwrap(), 2);
        assert!(!registry.contains("a"));
        assert!(registry.contains("x"));
    }

    #[test]
    fn json_store_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("data").join("subscribers.json"));
        assert!(store.load().unwrap().is_empty());

        let registry = SubscriberRegistry::new(Box::new(store));
        registry.subscribe("qq:group:1");
        registry.subscribe("qq:private:2");

        let raw = fs::read_to_string(dir.path().join("data").join("subscribers.json")).unwrap();
        let list: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(list, vec!["qq:group:1", "qq:private:2"]);
    }

    #[test]
    fn json_store_collapses_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscribers.json");
        fs::write(&path, r#"["a","b","a"]"#).unwrap();

        let registry = SubscriberRegistry::new(Box::new(JsonFileStore::new(&path)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn corrupt_file_starts_empty_and_reload_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscribers.json");
        fs::write(&path, "not json").unwrap();

        let registry = SubscriberRegistry::new(Box::new(JsonFileStore::new(&path)));
        assert!(registry.is_empty());
        assert!(matches!(registry.reload(), Err(StoreError::Json(_))));
    }
}
