//! Integration tests for the agent against the in-memory dataplane.
//!
//! These exercise the configurators together through their public API, the
//! way the agent drives them: full resyncs, dependency resolution across
//! resource kinds and recreate decisions.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use vpp_agent::diff::is_interface_modified;
use vpp_agent::interfaces::{
    InterfaceConfigurator, InterfaceConfiguratorConfig, InterfaceRegistry, LogStatePublisher,
};
use vpp_agent::afpacket::LinuxSupport;
use vpp_agent::nat::static_mapping_identifier;
use vpp_agent::stn::{stn_identifier, StnConfigurator};
use vpp_agent::{AgentConfig, Change, ChangeEvent, DesiredState, ResourceKind, VppAgent};
use vpp_dataplane::model::{
    AddressPool, AfPacketLink, BfdAuthKey, BfdEchoFunction, BfdSession, DNatConfig, Interface,
    InterfaceLink, LocalIp, MemifLink, Nat44Global, NatInterface, Protocol, StaticMapping,
    StnRule, VxlanLink,
};
use vpp_dataplane::types::StaticMappingContext;
use vpp_dataplane::{InMemoryDataplane, NO_INTERFACE};
use vpp_types::{Ipv4Address, MacAddress};

// ============================================================================
// Fixtures
// ============================================================================

fn agent() -> (VppAgent, Arc<InMemoryDataplane>) {
    let dataplane = Arc::new(InMemoryDataplane::new());
    let agent = VppAgent::new(AgentConfig::default(), dataplane.clone(), Arc::new(LogStatePublisher));
    (agent, dataplane)
}

fn interfaces(linux: Option<LinuxSupport>) -> (InterfaceConfigurator, Arc<InMemoryDataplane>) {
    let dataplane = Arc::new(InMemoryDataplane::new());
    let registry = Arc::new(InterfaceRegistry::new("interfaces"));
    let configurator = InterfaceConfigurator::new(
        InterfaceConfiguratorConfig::default(),
        dataplane.clone(),
        registry,
        linux,
    );
    (configurator, dataplane)
}

fn loopback(name: &str, ips: &[&str]) -> Interface {
    let mut interface = Interface::new(name, InterfaceLink::Loopback);
    interface.enabled = true;
    interface.ip_addresses = ips.iter().map(|ip| ip.to_string()).collect();
    interface
}

fn memif(name: &str, socket: &str, id: u32) -> Interface {
    let mut interface = Interface::new(
        name,
        InterfaceLink::Memif(MemifLink {
            id,
            socket_filename: socket.to_string(),
            ..Default::default()
        }),
    );
    interface.enabled = true;
    interface
}

fn vxlan(name: &str, multicast: &str) -> Interface {
    Interface::new(
        name,
        InterfaceLink::Vxlan(VxlanLink {
            src_address: "10.0.0.1".to_string(),
            dst_address: String::new(),
            vni: 10,
            multicast: Some(multicast.to_string()),
        }),
    )
}

fn web_mapping(external_ip: &str) -> StaticMapping {
    StaticMapping {
        external_ip: external_ip.to_string(),
        external_port: 80,
        local_ips: vec![LocalIp {
            local_ip: "192.168.0.1".to_string(),
            local_port: 8080,
            ..Default::default()
        }],
        protocol: Protocol::Tcp,
        ..Default::default()
    }
}

fn full_state() -> DesiredState {
    DesiredState {
        interfaces: vec![
            loopback("loop1", &["10.1.1.1/24"]),
            memif("memif1", "/run/vpp/memif-a.sock", 1),
        ],
        bfd_auth_keys: vec![BfdAuthKey {
            name: "key1".to_string(),
            id: 1,
            authentication_type: Default::default(),
            secret: "s3cr3t".to_string(),
        }],
        bfd_sessions: vec![BfdSession {
            interface: "loop1".to_string(),
            source_address: "10.1.1.1".to_string(),
            destination_address: "10.1.1.2".to_string(),
            enabled: true,
            desired_min_tx_interval: 100_000,
            required_min_rx_interval: 100_000,
            detect_multiplier: 3,
            authentication: None,
        }],
        bfd_echo_functions: vec![BfdEchoFunction {
            name: "echo".to_string(),
            echo_source_interface: "loop1".to_string(),
        }],
        stn_rules: vec![StnRule {
            rule_name: "r1".to_string(),
            interface: "loop1".to_string(),
            ip_address: "10.1.1.5".to_string(),
        }],
        nat44_global: Some(Nat44Global {
            forwarding: true,
            nat_interfaces: vec![NatInterface {
                name: "loop1".to_string(),
                is_inside: true,
                output_feature: false,
            }],
            address_pools: vec![AddressPool {
                first_src_address: "80.0.0.10".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }),
        dnats: vec![DNatConfig {
            label: "web".to_string(),
            st_mappings: vec![web_mapping("80.0.0.1")],
            id_mappings: vec![],
        }],
    }
}

// ============================================================================
// Resync
// ============================================================================

#[test]
fn test_resync_twice_is_idempotent() {
    let (mut agent, dataplane) = agent();
    let desired = full_state();

    let first = agent.resync(&desired);
    assert!(first.is_clean(), "{:?}", first.errors().collect::<Vec<_>>());
    assert!(first.totals().configured > 0);

    dataplane.clear_calls();
    let second = agent.resync(&desired);
    assert!(second.is_clean(), "{:?}", second.errors().collect::<Vec<_>>());
    assert_eq!(second.totals().changes(), 0);
    assert_eq!(dataplane.mutating_calls(), vec![]);
    assert!(agent.stn().index_exists_for(&stn_identifier("loop1")));
    assert!(agent.nat().is_dnat_registered("web"));
}

#[test]
fn test_resync_removes_obsolete_and_adopts_untagged() {
    let (mut agent, dataplane) = agent();
    dataplane.seed_interface("stale", &loopback("stale", &["10.9.9.9/24"]));
    let mac = MacAddress::new([2, 0, 0, 0, 0, 1]);
    let nic = dataplane.add_physical_interface("GigabitEthernet0/8/0", Some(mac));

    let mut eth0 = Interface::new("eth0", InterfaceLink::Ethernet);
    eth0.phys_address = Some(mac);
    let desired = DesiredState {
        interfaces: vec![eth0],
        ..Default::default()
    };
    let report = agent.resync(&desired);

    let outcome = report.outcome(ResourceKind::Interface).unwrap();
    assert!(outcome.is_clean());
    assert_eq!(outcome.counts.deleted, 1);
    assert_eq!(dataplane.find_by_tag("stale"), None);
    assert_eq!(dataplane.find_by_tag("eth0"), Some(nic));
    assert_eq!(agent.registry().handle_of("eth0"), Some(nic));
}

#[test]
fn test_dnat_resync_first_match_wins() {
    let (mut agent, dataplane) = agent();
    let dumped = StaticMappingContext {
        tag: "web".to_string(),
        address_only: false,
        local_ip: Ipv4Address::new(192, 168, 0, 1),
        local_port: 8080,
        external_ip: Ipv4Address::new(80, 0, 0, 1),
        external_port: 80,
        external_sw_if_index: NO_INTERFACE,
        protocol: Protocol::Tcp,
        vrf_id: 0,
        twice_nat: false,
        self_twice_nat: false,
    };
    dataplane.seed_static_mapping(dumped.clone());
    dataplane.seed_static_mapping(dumped.clone());

    let desired = DesiredState {
        dnats: vec![DNatConfig {
            label: "web".to_string(),
            st_mappings: vec![web_mapping("80.0.0.1")],
            id_mappings: vec![],
        }],
        ..Default::default()
    };
    let report = agent.resync(&desired);

    let outcome = report.outcome(ResourceKind::DNat).unwrap();
    assert!(outcome.is_clean());
    assert_eq!(outcome.counts.registered, 1);
    assert_eq!(outcome.counts.deleted, 1);
    assert_eq!(dataplane.static_mappings(), vec![dumped]);
}

// ============================================================================
// Pending dependencies
// ============================================================================

#[test]
fn test_afpacket_pending_round_trip() {
    let (mut configurator, dataplane) = interfaces(Some(LinuxSupport::new()));
    let afpacket = Interface::new(
        "afp1",
        InterfaceLink::AfPacket(AfPacketLink {
            host_if_name: "h1".to_string(),
        }),
    );

    let outcome = configurator.configure(&afpacket).unwrap();
    assert!(outcome.is_pending());
    assert_eq!(outcome.handle(), 0);
    assert_eq!(dataplane.mutating_calls(), vec![]);

    configurator.resolve_created_linux_interface("h1").unwrap();
    let handle = configurator.registry().handle_of("afp1").unwrap();
    assert_ne!(handle, 0);

    // A repeated notification changes nothing.
    dataplane.clear_calls();
    configurator.resolve_created_linux_interface("h1").unwrap();
    assert_eq!(dataplane.mutating_calls(), vec![]);

    configurator.resolve_deleted_linux_interface("h1").unwrap();
    assert!(!configurator.registry().contains("afp1"));
    assert!(!configurator.afpacket().is_pending("afp1"));
}

#[test]
fn test_stn_rule_waits_for_interface() {
    let (mut ifaces, dataplane) = interfaces(None);
    let mut stn = StnConfigurator::new(dataplane.clone(), ifaces.registry().clone());
    let id = stn_identifier("eth1");
    let rule = StnRule {
        rule_name: "r1".to_string(),
        interface: "eth1".to_string(),
        ip_address: "10.0.0.1".to_string(),
    };

    assert!(stn.configure(&rule).unwrap().is_pending());
    assert!(stn.index_exists_for(&id));
    assert!(stn.unstored_index_exists_for(&id));
    assert!(dataplane.stn_rules().is_empty());

    ifaces.configure(&loopback("eth1", &["10.0.0.2/24"])).unwrap();
    stn.resolve_created_interface("eth1").unwrap();
    assert!(dataplane.call_names().contains(&"add_stn_rule"));
    assert!(stn.index_exists_for(&id));
    assert!(!stn.unstored_index_exists_for(&id));
    assert_eq!(dataplane.stn_rules().len(), 1);
}

#[test]
fn test_vxlan_resolved_by_multicast_interface() {
    let (mut configurator, _) = interfaces(None);
    let tunnel = vxlan("vxlan1", "mcast0");

    let outcome = configurator.configure(&tunnel).unwrap();
    assert!(outcome.is_pending());
    assert_eq!(outcome.handle(), 0);
    assert!(configurator.is_vxlan_pending("vxlan1"));

    configurator.configure(&loopback("mcast0", &["239.0.0.1/24"])).unwrap();
    assert!(!configurator.is_vxlan_pending("vxlan1"));
    assert!(configurator.registry().contains("vxlan1"));
}

#[test]
fn test_vxlan_rejects_non_multicast_source() {
    let (mut configurator, _) = interfaces(None);
    configurator.configure(&loopback("mcast0", &["10.0.0.9/24"])).unwrap();

    let err = configurator.configure(&vxlan("vxlan1", "mcast0")).unwrap_err();
    assert!(err.is_validation());
    assert!(!configurator.is_vxlan_pending("vxlan1"));
    assert!(!configurator.registry().contains("vxlan1"));
}

#[test]
fn test_agent_chains_interface_into_nat_and_stn() {
    let (mut agent, dataplane) = agent();
    let desired = full_state();
    agent
        .apply(ChangeEvent::Nat44Global(Change::Create(desired.nat44_global.clone().unwrap())))
        .unwrap();
    agent
        .apply(ChangeEvent::StnRule(Change::Create(desired.stn_rules[0].clone())))
        .unwrap();
    assert!(dataplane.stn_rules().is_empty());

    agent
        .apply(ChangeEvent::Interface(Change::Create(desired.interfaces[0].clone())))
        .unwrap();
    assert_eq!(dataplane.stn_rules().len(), 1);
    assert!(dataplane.call_names().contains(&"enable_nat44_interface"));
}

// ============================================================================
// Recreate decisions and diffing
// ============================================================================

#[test]
fn test_memif_recreate_versus_in_place() {
    let (mut configurator, dataplane) = interfaces(None);
    let old = memif("memif1", "/tmp/a.sock", 1);
    let handle = configurator.configure(&old).unwrap().handle();

    // Enabled and MAC are applied in place.
    dataplane.clear_calls();
    let mut toggled = old.clone();
    toggled.enabled = false;
    toggled.phys_address = Some(MacAddress::new([2, 0, 0, 0, 0, 9]));
    configurator.modify(&old, &toggled).unwrap();
    assert!(!dataplane.call_names().contains(&"delete_memif_interface"));
    assert_eq!(configurator.registry().handle_of("memif1"), Some(handle));

    // A new id forces delete then create.
    dataplane.clear_calls();
    let mut renumbered = toggled.clone();
    if let InterfaceLink::Memif(link) = &mut renumbered.link {
        link.id = 2;
    }
    configurator.modify(&toggled, &renumbered).unwrap();
    let names = dataplane.call_names();
    let deleted = names.iter().position(|n| *n == "delete_memif_interface").unwrap();
    let created = names.iter().position(|n| *n == "add_memif_interface").unwrap();
    assert!(deleted < created);
    assert_ne!(configurator.registry().handle_of("memif1"), Some(handle));
}

#[test]
fn test_link_local_address_is_not_a_modification() {
    let desired = loopback("loop1", &["10.0.0.1/24"]);
    let actual = loopback("loop1", &["10.0.0.1/24", "fe80::1/64"]);
    assert!(!is_interface_modified(&desired, &actual, 0));
}

#[test]
fn test_static_mapping_identifier_is_deterministic() {
    let mapping = web_mapping("10.0.0.1");
    let first = static_mapping_identifier(&mapping);
    assert_eq!(static_mapping_identifier(&mapping), first);
    assert_eq!(static_mapping_identifier(&mapping.clone()), first);
    assert_ne!(static_mapping_identifier(&web_mapping("10.0.0.2")), first);
}
