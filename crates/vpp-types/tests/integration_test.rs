//! Parsing and classification of the network primitives.

use pretty_assertions::assert_eq;
use vpp_types::{strip_mask, IpAddress, IpPrefix, MacAddress, ParseError};

#[test]
fn test_interface_prefix_keeps_host_bits() {
    let a: IpPrefix = "10.0.0.1/24".parse().unwrap();
    let b: IpPrefix = "10.0.0.2/24".parse().unwrap();
    assert_ne!(a, b);
    assert_eq!(a.to_string(), "10.0.0.1/24");
    assert_eq!(a.prefix_len(), 24);
}

#[test]
fn test_prefix_rejects_oversized_mask() {
    assert!(matches!(
        "10.0.0.1/33".parse::<IpPrefix>(),
        Err(ParseError::InvalidIpPrefix(_))
    ));
    assert!("2001:db8::1/129".parse::<IpPrefix>().is_err());
    assert!("10.0.0.1".parse::<IpPrefix>().is_err());
}

#[test]
fn test_link_local_and_multicast() {
    let link_local: IpPrefix = "fe80::1/64".parse().unwrap();
    assert!(link_local.is_link_local());
    let global: IpPrefix = "2001:db8::1/64".parse().unwrap();
    assert!(!global.is_link_local());

    let group: IpAddress = "239.1.1.1".parse().unwrap();
    assert!(group.is_multicast());
    let unicast: IpAddress = "10.1.1.1".parse().unwrap();
    assert!(!unicast.is_multicast());
}

#[test]
fn test_strip_mask() {
    assert_eq!(strip_mask("10.0.0.1/24"), "10.0.0.1");
    assert_eq!(strip_mask("10.0.0.1"), "10.0.0.1");
}

#[test]
fn test_mac_serde_normalizes_case() {
    let mac: MacAddress = serde_json::from_str("\"AA:BB:CC:DD:EE:01\"").unwrap();
    assert_eq!(serde_json::to_string(&mac).unwrap(), "\"aa:bb:cc:dd:ee:01\"");
    assert!(serde_json::from_str::<MacAddress>("\"aa:bb:cc\"").is_err());
}
