//! Structural comparison and correlation helpers shared by the configurators
//! and the resync engine.

use itertools::Itertools;
use std::collections::HashSet;
use std::hash::Hash;
use vpp_dataplane::model::{Interface, InterfaceKind, InterfaceLink, RxModeSettings};
use vpp_types::{IpPrefix, ParseError};

/// Splits two lists into `(removed, added)`, keeping input order.
pub fn diff_sets<T: Eq + Hash + Clone>(old: &[T], new: &[T]) -> (Vec<T>, Vec<T>) {
    let old_set: HashSet<&T> = old.iter().collect();
    let new_set: HashSet<&T> = new.iter().collect();
    let removed = old
        .iter()
        .filter(|item| !new_set.contains(item))
        .unique()
        .cloned()
        .collect();
    let added = new
        .iter()
        .filter(|item| !old_set.contains(item))
        .unique()
        .cloned()
        .collect();
    (removed, added)
}

pub fn parse_ip_addresses(addresses: &[String]) -> Result<Vec<IpPrefix>, ParseError> {
    addresses.iter().map(|ip| ip.parse()).collect()
}

/// Addresses the agent manages, i.e. without IPv6 link-local ones the
/// dataplane assigns on its own.
pub fn managed_addresses(addresses: &[IpPrefix]) -> Vec<IpPrefix> {
    addresses
        .iter()
        .filter(|ip| !ip.is_link_local())
        .copied()
        .collect()
}

/// Address diff as `(to_delete, to_add)`. Link-local addresses are never
/// part of the result.
pub fn ip_diff(old: &[IpPrefix], new: &[IpPrefix]) -> (Vec<IpPrefix>, Vec<IpPrefix>) {
    diff_sets(&managed_addresses(old), &managed_addresses(new))
}

/// Compares two address lists as sets, ignoring link-local entries.
/// Unparsable entries are compared verbatim.
pub fn same_ip_set(a: &[String], b: &[String]) -> bool {
    fn normalize(addresses: &[String]) -> HashSet<String> {
        addresses
            .iter()
            .filter_map(|ip| match ip.parse::<IpPrefix>() {
                Ok(prefix) if prefix.is_link_local() => None,
                Ok(prefix) => Some(prefix.to_string()),
                Err(_) => Some(ip.clone()),
            })
            .collect()
    }
    normalize(a) == normalize(b)
}

fn same_container_ip(a: Option<&str>, b: Option<&str>) -> bool {
    let parse = |ip: Option<&str>| {
        ip.filter(|ip| !ip.is_empty())
            .map(|ip| ip.parse::<IpPrefix>().map_err(|_| ip.to_string()))
    };
    parse(a) == parse(b)
}

/// MTU the agent enforces for `interface`, if any.
pub fn effective_mtu(interface: &Interface, default_mtu: u32) -> Option<u32> {
    if interface.kind() == InterfaceKind::Vxlan {
        return None;
    }
    let mtu = if interface.mtu != 0 { interface.mtu } else { default_mtu };
    (mtu != 0).then_some(mtu)
}

fn rx_mode_or_default(kind: InterfaceKind, rx_mode: Option<RxModeSettings>) -> RxModeSettings {
    rx_mode.unwrap_or_else(|| RxModeSettings::all_queues(kind.default_rx_mode()))
}

/// Whether the dumped interface `actual` differs from the desired one.
///
/// Link-local addresses are ignored, MTU is only compared when one is
/// enforced, the MAC only when the desired config sets one, and only the
/// sub-config of the declared type is compared.
pub fn is_interface_modified(desired: &Interface, actual: &Interface, default_mtu: u32) -> bool {
    if desired.kind() != actual.kind() {
        return true;
    }
    if desired.enabled != actual.enabled
        || desired.set_dhcp_client != actual.set_dhcp_client
        || desired.vrf != actual.vrf
    {
        return true;
    }
    if let Some(mac) = desired.phys_address {
        if actual.phys_address != Some(mac) {
            return true;
        }
    }
    if let Some(mtu) = effective_mtu(desired, default_mtu) {
        if actual.mtu != mtu {
            return true;
        }
    }
    if desired.rx_mode.is_some()
        && rx_mode_or_default(desired.kind(), desired.rx_mode)
            != rx_mode_or_default(actual.kind(), actual.rx_mode)
    {
        return true;
    }
    if desired.unnumbered_donor() != actual.unnumbered_donor() {
        return true;
    }
    if desired.unnumbered_donor().is_none() && !same_ip_set(&desired.ip_addresses, &actual.ip_addresses) {
        return true;
    }
    if !same_container_ip(
        desired.container_ip_address.as_deref(),
        actual.container_ip_address.as_deref(),
    ) {
        return true;
    }
    is_link_modified(&desired.link, &actual.link)
}

fn is_link_modified(desired: &InterfaceLink, actual: &InterfaceLink) -> bool {
    match (desired, actual) {
        (InterfaceLink::Tap(d), InterfaceLink::Tap(a)) => {
            d.version != a.version
                || d.host_if_name != a.host_if_name
                || d.namespace != a.namespace
                || (d.rx_ring_size != 0 && d.rx_ring_size != a.rx_ring_size)
                || (d.tx_ring_size != 0 && d.tx_ring_size != a.tx_ring_size)
        }
        // Secret, ring size and buffer size are not dumped.
        (InterfaceLink::Memif(d), InterfaceLink::Memif(a)) => {
            d.master != a.master
                || d.mode != a.mode
                || d.id != a.id
                || d.socket_filename != a.socket_filename
                || d.rx_queues != a.rx_queues
                || d.tx_queues != a.tx_queues
        }
        (InterfaceLink::Vxlan(d), InterfaceLink::Vxlan(a)) => {
            let multicast = d.multicast.as_deref().filter(|m| !m.is_empty());
            // With a multicast interface the destination is derived from it.
            let dst_changed = multicast.is_none() && d.dst_address != a.dst_address;
            d.src_address != a.src_address
                || dst_changed
                || d.vni != a.vni
                || multicast != a.multicast.as_deref().filter(|m| !m.is_empty())
        }
        (InterfaceLink::AfPacket(d), InterfaceLink::AfPacket(a)) => d.host_if_name != a.host_if_name,
        (InterfaceLink::Loopback, InterfaceLink::Loopback) => false,
        (InterfaceLink::Ethernet, InterfaceLink::Ethernet) => false,
        _ => true,
    }
}

/// Whether changing `old` into `new` cannot be done in place.
pub fn link_requires_recreate(old: &InterfaceLink, new: &InterfaceLink) -> bool {
    match (old, new) {
        (InterfaceLink::Tap(o), InterfaceLink::Tap(n)) => {
            o.version != n.version || o.host_if_name != n.host_if_name || o.namespace != n.namespace
        }
        (InterfaceLink::Memif(o), InterfaceLink::Memif(n)) => {
            o.socket_filename != n.socket_filename
                || o.id != n.id
                || o.mode != n.mode
                || o.master != n.master
                || o.rx_queues != n.rx_queues
                || o.tx_queues != n.tx_queues
        }
        (InterfaceLink::Vxlan(o), InterfaceLink::Vxlan(n)) => {
            o.vni != n.vni
                || o.src_address != n.src_address
                || o.dst_address != n.dst_address
                || o.multicast != n.multicast
        }
        (InterfaceLink::AfPacket(o), InterfaceLink::AfPacket(n)) => o.host_if_name != n.host_if_name,
        (InterfaceLink::Loopback, InterfaceLink::Loopback) => false,
        (InterfaceLink::Ethernet, InterfaceLink::Ethernet) => false,
        _ => true,
    }
}

/// Finds the desired config an untagged dumped interface belongs to.
///
/// A MAC match wins. Otherwise the managed address sets must be equal and
/// non-empty.
pub fn correlate_interface<'a>(actual: &Interface, candidates: &[&'a Interface]) -> Option<&'a Interface> {
    if let Some(mac) = actual.phys_address {
        if let Some(found) = candidates.iter().find(|c| c.phys_address == Some(mac)) {
            return Some(*found);
        }
    }
    let has_managed_ip = actual
        .ip_addresses
        .iter()
        .any(|ip| !ip.parse::<IpPrefix>().map(|p| p.is_link_local()).unwrap_or(false));
    if !has_managed_ip {
        return None;
    }
    candidates
        .iter()
        .find(|c| !c.ip_addresses.is_empty() && same_ip_set(&c.ip_addresses, &actual.ip_addresses))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vpp_dataplane::model::{MemifLink, RxMode, TapLink, VxlanLink};
    use vpp_types::MacAddress;

    fn loopback(name: &str, ips: &[&str]) -> Interface {
        let mut iface = Interface::new(name, InterfaceLink::Loopback);
        iface.enabled = true;
        iface.mtu = 1500;
        iface.ip_addresses = ips.iter().map(|ip| ip.to_string()).collect();
        iface
    }

    #[test]
    fn test_diff_sets_keeps_order() {
        let (removed, added) = diff_sets(&[1, 2, 3, 3], &[3, 4, 5, 4]);
        assert_eq!(removed, vec![1, 2]);
        assert_eq!(added, vec![4, 5]);
    }

    #[test]
    fn test_ip_diff_ignores_link_local() {
        let old = parse_ip_addresses(&["10.0.0.1/24".to_string(), "fe80::1/64".to_string()]).unwrap();
        let new = parse_ip_addresses(&["10.0.0.2/24".to_string()]).unwrap();
        let (del, add) = ip_diff(&old, &new);
        assert_eq!(del, vec!["10.0.0.1/24".parse::<IpPrefix>().unwrap()]);
        assert_eq!(add, vec!["10.0.0.2/24".parse::<IpPrefix>().unwrap()]);
    }

    #[test]
    fn test_link_local_address_is_not_a_modification() {
        let desired = loopback("loop1", &["10.0.0.1/24", "2001:db8::1/64"]);
        let actual = loopback("loop1", &["10.0.0.1/24", "2001:db8::1/64", "fe80::3/64"]);
        assert!(!is_interface_modified(&desired, &actual, 0));

        let actual = loopback("loop1", &["2001:db8::1/64", "10.0.0.1/24"]);
        assert!(!is_interface_modified(&desired, &actual, 0));
    }

    #[test]
    fn test_ip_change_is_a_modification() {
        let desired = loopback("loop1", &["10.0.0.1/24"]);
        let actual = loopback("loop1", &["10.0.0.1/16"]);
        assert!(is_interface_modified(&desired, &actual, 0));
    }

    #[test]
    fn test_mac_compared_only_when_set() {
        let mut desired = loopback("loop1", &[]);
        let mut actual = loopback("loop1", &[]);
        actual.phys_address = Some(MacAddress::new([2, 0, 0, 0, 0, 1]));
        assert!(!is_interface_modified(&desired, &actual, 0));

        desired.phys_address = Some(MacAddress::new([2, 0, 0, 0, 0, 2]));
        assert!(is_interface_modified(&desired, &actual, 0));
    }

    #[test]
    fn test_mtu_rules() {
        let mut desired = loopback("loop1", &[]);
        desired.mtu = 0;
        let mut actual = loopback("loop1", &[]);
        actual.mtu = 9000;
        assert!(!is_interface_modified(&desired, &actual, 0));
        assert!(is_interface_modified(&desired, &actual, 1500));

        let vxlan = |mtu| {
            let mut iface = Interface::new(
                "vx1",
                InterfaceLink::Vxlan(VxlanLink {
                    src_address: "10.0.0.1".to_string(),
                    dst_address: "10.0.0.2".to_string(),
                    vni: 10,
                    multicast: None,
                }),
            );
            iface.mtu = mtu;
            iface
        };
        assert!(!is_interface_modified(&vxlan(1500), &vxlan(9000), 1500));
    }

    #[test]
    fn test_vxlan_multicast_ignores_destination() {
        let link = |dst: &str| {
            InterfaceLink::Vxlan(VxlanLink {
                src_address: "10.0.0.1".to_string(),
                dst_address: dst.to_string(),
                vni: 10,
                multicast: Some("mcast0".to_string()),
            })
        };
        assert!(!is_link_modified(&link("10.0.0.2"), &link("239.1.1.1")));
    }

    #[test]
    fn test_rx_mode_default_equivalence() {
        let mut desired = loopback("loop1", &[]);
        desired.rx_mode = Some(RxModeSettings::all_queues(RxMode::Default));
        let actual = loopback("loop1", &[]);
        assert!(!is_interface_modified(&desired, &actual, 0));

        desired.rx_mode = Some(RxModeSettings::all_queues(RxMode::Polling));
        assert!(is_interface_modified(&desired, &actual, 0));
    }

    #[test]
    fn test_memif_recreate_fields() {
        let base = MemifLink {
            id: 1,
            socket_filename: "/tmp/a.sock".to_string(),
            ..Default::default()
        };
        let mut other = base.clone();
        other.id = 2;
        assert!(link_requires_recreate(
            &InterfaceLink::Memif(base.clone()),
            &InterfaceLink::Memif(other)
        ));

        let mut ring = base.clone();
        ring.ring_size = 2048;
        assert!(!link_requires_recreate(
            &InterfaceLink::Memif(base.clone()),
            &InterfaceLink::Memif(ring)
        ));
        assert!(link_requires_recreate(
            &InterfaceLink::Memif(base),
            &InterfaceLink::Loopback
        ));
    }

    #[test]
    fn test_tap_recreate_fields() {
        let old = TapLink {
            version: 1,
            host_if_name: "tap-host".to_string(),
            ..Default::default()
        };
        let mut new = old.clone();
        new.rx_ring_size = 256;
        assert!(!link_requires_recreate(&InterfaceLink::Tap(old.clone()), &InterfaceLink::Tap(new.clone())));
        new.version = 2;
        assert!(link_requires_recreate(&InterfaceLink::Tap(old), &InterfaceLink::Tap(new)));
    }

    #[test]
    fn test_correlate_by_mac_then_ips() {
        let mac = MacAddress::new([2, 0, 0, 0, 0, 9]);
        let mut by_mac = Interface::new("eth-a", InterfaceLink::Ethernet);
        by_mac.phys_address = Some(mac);
        let mut by_ip = Interface::new("eth-b", InterfaceLink::Ethernet);
        by_ip.ip_addresses = vec!["192.168.1.1/24".to_string()];
        let candidates = vec![&by_ip, &by_mac];

        let mut actual = Interface::new("", InterfaceLink::Ethernet);
        actual.phys_address = Some(mac);
        actual.ip_addresses = vec!["192.168.1.1/24".to_string()];
        assert_eq!(correlate_interface(&actual, &candidates).map(|i| i.name.as_str()), Some("eth-a"));

        actual.phys_address = Some(MacAddress::new([2, 0, 0, 0, 0, 1]));
        assert_eq!(correlate_interface(&actual, &candidates).map(|i| i.name.as_str()), Some("eth-b"));

        actual.ip_addresses = vec!["fe80::1/64".to_string()];
        assert!(correlate_interface(&actual, &candidates).is_none());
    }
}
