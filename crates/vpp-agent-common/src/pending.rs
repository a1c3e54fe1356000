//! Pending-dependency cache.
//!
//! Tracks resources whose configuration waits on another resource (a host
//! interface, a multicast interface, an address donor, an attachment
//! interface), and the resources currently enacted on top of one, so the
//! configurator can reverse them when the dependency goes away.
//!
//! The cache is owned by a single configurator and is not shared.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry<C> {
    dependency: String,
    config: C,
}

/// Resources waiting on, or bound to, a named dependency.
///
/// A resource is either pending or bound, never both. Moving it from one side
/// to the other is always explicit: [`resolve_created`](Self::resolve_created)
/// only hands the pending configs back, and the caller binds the ones it
/// managed to configure.
#[derive(Debug)]
pub struct PendingCache<C> {
    pending: HashMap<String, Entry<C>>,
    waiters: HashMap<String, BTreeSet<String>>,
    bound: HashMap<String, Entry<C>>,
    dependents: HashMap<String, BTreeSet<String>>,
}

impl<C> Default for PendingCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> PendingCache<C> {
    pub fn new() -> Self {
        PendingCache {
            pending: HashMap::new(),
            waiters: HashMap::new(),
            bound: HashMap::new(),
            dependents: HashMap::new(),
        }
    }

    /// Parks `resource` until `dependency` is created.
    pub fn defer(&mut self, resource: impl Into<String>, dependency: impl Into<String>, config: C) {
        let resource = resource.into();
        let dependency = dependency.into();
        self.remove(&resource);
        debug!(%resource, %dependency, "deferred");
        self.waiters
            .entry(dependency.clone())
            .or_default()
            .insert(resource.clone());
        self.pending.insert(resource, Entry { dependency, config });
    }

    /// Records that `resource` is enacted on top of `dependency`.
    pub fn bind(&mut self, resource: impl Into<String>, dependency: impl Into<String>, config: C) {
        let resource = resource.into();
        let dependency = dependency.into();
        self.remove(&resource);
        self.dependents
            .entry(dependency.clone())
            .or_default()
            .insert(resource.clone());
        self.bound.insert(resource, Entry { dependency, config });
    }

    /// Takes every resource waiting on `dependency`.
    ///
    /// A second call for the same dependency returns nothing.
    pub fn resolve_created(&mut self, dependency: &str) -> Vec<(String, C)> {
        let Some(resources) = self.waiters.remove(dependency) else {
            return Vec::new();
        };
        let resolved: Vec<(String, C)> = resources
            .into_iter()
            .filter_map(|resource| {
                self.pending
                    .remove(&resource)
                    .map(|entry| (resource, entry.config))
            })
            .collect();
        debug!(dependency, count = resolved.len(), "dependency created");
        resolved
    }

    /// Takes every resource bound to `dependency`.
    ///
    /// The caller reverses them and usually defers them again.
    pub fn resolve_deleted(&mut self, dependency: &str) -> Vec<(String, C)> {
        let Some(resources) = self.dependents.remove(dependency) else {
            return Vec::new();
        };
        let unbound: Vec<(String, C)> = resources
            .into_iter()
            .filter_map(|resource| {
                self.bound
                    .remove(&resource)
                    .map(|entry| (resource, entry.config))
            })
            .collect();
        debug!(dependency, count = unbound.len(), "dependency deleted");
        unbound
    }

    /// Forgets `resource`, pending or bound.
    pub fn remove(&mut self, resource: &str) -> Option<C> {
        if let Some(entry) = self.pending.remove(resource) {
            detach(&mut self.waiters, &entry.dependency, resource);
            return Some(entry.config);
        }
        if let Some(entry) = self.bound.remove(resource) {
            detach(&mut self.dependents, &entry.dependency, resource);
            return Some(entry.config);
        }
        None
    }

    pub fn is_pending(&self, resource: &str) -> bool {
        self.pending.contains_key(resource)
    }

    pub fn is_bound(&self, resource: &str) -> bool {
        self.bound.contains_key(resource)
    }

    /// The dependency `resource` waits on or is bound to.
    pub fn dependency_of(&self, resource: &str) -> Option<&str> {
        self.pending
            .get(resource)
            .or_else(|| self.bound.get(resource))
            .map(|entry| entry.dependency.as_str())
    }

    /// The cached config of `resource`, pending or bound.
    pub fn get(&self, resource: &str) -> Option<&C> {
        self.pending
            .get(resource)
            .or_else(|| self.bound.get(resource))
            .map(|entry| &entry.config)
    }

    /// Resources bound to `dependency`, in name order.
    pub fn bound_to(&self, dependency: &str) -> Vec<String> {
        self.dependents
            .get(dependency)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Resources waiting on `dependency`, in name order.
    pub fn waiting_on(&self, dependency: &str) -> Vec<String> {
        self.waiters
            .get(dependency)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of pending resources.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn bound_len(&self) -> usize {
        self.bound.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.waiters.clear();
        self.bound.clear();
        self.dependents.clear();
    }
}

fn detach(index: &mut HashMap<String, BTreeSet<String>>, dependency: &str, resource: &str) {
    if let Some(set) = index.get_mut(dependency) {
        set.remove(resource);
        if set.is_empty() {
            index.remove(dependency);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defer_and_resolve_created() {
        let mut cache: PendingCache<&str> = PendingCache::new();
        cache.defer("afp1", "veth1", "cfg1");
        cache.defer("afp2", "veth1", "cfg2");
        cache.defer("afp3", "veth2", "cfg3");

        assert!(cache.is_pending("afp1"));
        assert_eq!(cache.dependency_of("afp1"), Some("veth1"));
        assert_eq!(cache.waiting_on("veth1"), vec!["afp1".to_string(), "afp2".to_string()]);

        let resolved = cache.resolve_created("veth1");
        assert_eq!(
            resolved,
            vec![("afp1".to_string(), "cfg1"), ("afp2".to_string(), "cfg2")]
        );
        assert!(!cache.is_pending("afp1"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_resolve_created_is_idempotent() {
        let mut cache: PendingCache<u32> = PendingCache::new();
        cache.defer("vxlan1", "mcast0", 1);

        assert_eq!(cache.resolve_created("mcast0").len(), 1);
        assert!(cache.resolve_created("mcast0").is_empty());
    }

    #[test]
    fn test_resolve_deleted_returns_bound() {
        let mut cache: PendingCache<u32> = PendingCache::new();
        cache.bind("tap1", "loop1", 1);
        cache.bind("tap2", "loop1", 2);
        cache.defer("tap3", "loop1", 3);

        assert_eq!(cache.bound_to("loop1"), vec!["tap1".to_string(), "tap2".to_string()]);
        let unbound = cache.resolve_deleted("loop1");
        assert_eq!(unbound, vec![("tap1".to_string(), 1), ("tap2".to_string(), 2)]);
        assert_eq!(cache.bound_len(), 0);
        assert!(cache.is_pending("tap3"));
        assert!(cache.resolve_deleted("loop1").is_empty());
    }

    #[test]
    fn test_pending_and_bound_are_exclusive() {
        let mut cache: PendingCache<u32> = PendingCache::new();
        cache.defer("afp1", "veth1", 1);
        cache.bind("afp1", "veth1", 2);

        assert!(!cache.is_pending("afp1"));
        assert!(cache.is_bound("afp1"));
        assert!(cache.waiting_on("veth1").is_empty());
        assert_eq!(cache.get("afp1"), Some(&2));

        cache.defer("afp1", "veth1", 3);
        assert!(cache.is_pending("afp1"));
        assert!(cache.bound_to("veth1").is_empty());
    }

    #[test]
    fn test_remove() {
        let mut cache: PendingCache<u32> = PendingCache::new();
        cache.defer("afp1", "veth1", 1);

        assert_eq!(cache.remove("afp1"), Some(1));
        assert_eq!(cache.remove("afp1"), None);
        assert!(cache.resolve_created("veth1").is_empty());
    }

    #[test]
    fn test_redefer_moves_dependency() {
        let mut cache: PendingCache<u32> = PendingCache::new();
        cache.defer("afp1", "veth1", 1);
        cache.defer("afp1", "veth2", 1);

        assert!(cache.resolve_created("veth1").is_empty());
        assert_eq!(cache.resolve_created("veth2").len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut cache: PendingCache<u32> = PendingCache::new();
        cache.defer("a", "x", 1);
        cache.bind("b", "y", 2);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.bound_len(), 0);
        assert!(cache.get("b").is_none());
    }
}
