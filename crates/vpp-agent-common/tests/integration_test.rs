//! Index registry and pending cache behavior across a dependency's lifetime.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use vpp_agent_common::{IndexRegistry, PendingCache};

#[test]
fn test_registry_stays_bijective_on_handle_reuse() {
    let registry: IndexRegistry<u32> = IndexRegistry::new("interfaces");
    registry.register("loop1", 1, 10);
    registry.register("loop2", 2, 20);

    // The dataplane recycled handle 1 for a new interface.
    registry.unregister("loop1");
    registry.register("tap1", 1, 30);
    assert_eq!(registry.name_of(1).as_deref(), Some("tap1"));
    assert_eq!(registry.handle_of("loop1"), None);

    // Re-registering a name under a new handle drops the old handle.
    registry.register("tap1", 3, 30);
    assert_eq!(registry.name_of(1), None);
    assert_eq!(registry.handle_of("tap1"), Some(3));
    assert_eq!(registry.len(), 2);

    for entry in registry.entries() {
        assert_eq!(registry.name_of(entry.handle).as_deref(), Some(entry.name.as_str()));
    }
}

#[test]
fn test_registry_shared_between_threads() {
    let registry: Arc<IndexRegistry<()>> = Arc::new(IndexRegistry::new("interfaces"));

    let workers: Vec<_> = (0..4u32)
        .map(|worker| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..25u32 {
                    let handle = worker * 100 + i;
                    registry.register(format!("if-{}", handle), handle, ());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(registry.len(), 100);
    assert_eq!(registry.handle_of("if-307"), Some(307));
}

#[test]
fn test_pending_follows_dependency_lifetime() {
    let mut cache: PendingCache<&'static str> = PendingCache::new();
    cache.defer("stn-iface-eth1", "eth1", "10.0.0.1");
    cache.defer("nat-eth1/in", "eth1", "inside");
    cache.defer("afpacket1", "veth1", "host veth1");

    // eth1 appears: both dependents are handed back and the caller binds them.
    let ready = cache.resolve_created("eth1");
    assert_eq!(ready.len(), 2);
    for (resource, config) in ready {
        cache.bind(resource, "eth1", config);
    }
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.bound_len(), 2);
    assert_eq!(cache.bound_to("eth1"), vec!["nat-eth1/in", "stn-iface-eth1"]);

    // A second notification for the same dependency is a no-op.
    assert!(cache.resolve_created("eth1").is_empty());

    // eth1 goes away: bound resources come back for reversal.
    let unbound = cache.resolve_deleted("eth1");
    assert_eq!(unbound.len(), 2);
    for (resource, config) in unbound {
        cache.defer(resource, "eth1", config);
    }
    assert!(cache.is_pending("stn-iface-eth1"));
    assert!(!cache.is_bound("stn-iface-eth1"));
    assert_eq!(cache.waiting_on("eth1"), vec!["nat-eth1/in", "stn-iface-eth1"]);
    assert_eq!(cache.dependency_of("afpacket1"), Some("veth1"));
}

#[test]
fn test_pending_remove_detaches_from_dependency() {
    let mut cache: PendingCache<u32> = PendingCache::new();
    cache.defer("vxlan1", "mcast1", 1);
    cache.defer("vxlan2", "mcast1", 2);

    assert_eq!(cache.remove("vxlan1"), Some(1));
    assert_eq!(cache.remove("vxlan1"), None);

    let ready = cache.resolve_created("mcast1");
    assert_eq!(ready, vec![("vxlan2".to_string(), 2)]);
    assert!(cache.is_empty());
}
