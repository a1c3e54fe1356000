//! Name to handle index with attached metadata.
//!
//! Configurators register every resource they enacted here. The interface
//! registry is also read by the state watcher, which runs on another task,
//! so all access goes through one `RwLock`. No method calls out while the lock
//! is held, and lookups never create entries.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// A registered resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry<M> {
    pub name: String,
    pub handle: u32,
    pub metadata: M,
}

#[derive(Debug)]
struct Inner<M> {
    by_name: HashMap<String, (u32, M)>,
    by_handle: HashMap<u32, String>,
}

/// Bidirectional `name <-> handle` map.
///
/// At most one entry exists per name and per handle: registering a name or a
/// handle that is already taken replaces the previous entry.
///
/// ```
/// use vpp_agent_common::IndexRegistry;
///
/// let registry: IndexRegistry<&str> = IndexRegistry::new("interfaces");
/// registry.register("tap1", 1, "meta");
/// assert_eq!(registry.lookup_by_handle(1), Some(("tap1".to_string(), "meta")));
///
/// registry.register("tap2", 1, "other");
/// assert!(registry.lookup_by_name("tap1").is_none());
/// ```
#[derive(Debug)]
pub struct IndexRegistry<M> {
    title: String,
    inner: RwLock<Inner<M>>,
}

impl<M: Clone> IndexRegistry<M> {
    pub fn new(title: impl Into<String>) -> Self {
        IndexRegistry {
            title: title.into(),
            inner: RwLock::new(Inner {
                by_name: HashMap::new(),
                by_handle: HashMap::new(),
            }),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<M>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<M>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, name: impl Into<String>, handle: u32, metadata: M) {
        let name = name.into();
        let mut inner = self.write();

        if let Some((old_handle, _)) = inner.by_name.remove(&name) {
            inner.by_handle.remove(&old_handle);
        }
        if let Some(old_name) = inner.by_handle.remove(&handle) {
            inner.by_name.remove(&old_name);
            debug!(registry = %self.title, %old_name, handle, "handle re-assigned");
        }

        inner.by_handle.insert(handle, name.clone());
        debug!(registry = %self.title, %name, handle, "registered");
        inner.by_name.insert(name, (handle, metadata));
    }

    pub fn unregister(&self, name: &str) -> Option<(u32, M)> {
        let mut inner = self.write();
        let (handle, metadata) = inner.by_name.remove(name)?;
        inner.by_handle.remove(&handle);
        debug!(registry = %self.title, name, handle, "unregistered");
        Some((handle, metadata))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<(u32, M)> {
        self.read().by_name.get(name).cloned()
    }

    pub fn lookup_by_handle(&self, handle: u32) -> Option<(String, M)> {
        let inner = self.read();
        let name = inner.by_handle.get(&handle)?;
        let (_, metadata) = inner.by_name.get(name)?;
        Some((name.clone(), metadata.clone()))
    }

    /// Handle of `name`, without cloning its metadata.
    pub fn handle_of(&self, name: &str) -> Option<u32> {
        self.read().by_name.get(name).map(|(handle, _)| *handle)
    }

    pub fn name_of(&self, handle: u32) -> Option<String> {
        self.read().by_handle.get(&handle).cloned()
    }

    /// Replaces the metadata of an existing entry. Returns false if `name` is
    /// not registered.
    pub fn update_metadata(&self, name: &str, metadata: M) -> bool {
        match self.write().by_name.get_mut(name) {
            Some(entry) => {
                entry.1 = metadata;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().by_name.is_empty()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// A sorted copy of every entry.
    pub fn entries(&self) -> Vec<IndexEntry<M>> {
        let mut entries: Vec<IndexEntry<M>> = self
            .read()
            .by_name
            .iter()
            .map(|(name, (handle, metadata))| IndexEntry {
                name: name.clone(),
                handle: *handle,
                metadata: metadata.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn clear(&self) {
        let mut inner = self.write();
        inner.by_name.clear();
        inner.by_handle.clear();
        debug!(registry = %self.title, "cleared");
    }
}
