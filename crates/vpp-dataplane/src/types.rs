//! Dataplane-side records: request contexts, dump details and notifications.
//!
//! Requests and dumps share record types where the dataplane reports back
//! exactly what it was given (BFD sessions, NAT mappings, STN rules), so a
//! dumped record can be compared to the one the agent would send.

use crate::model::{BfdAuthentication, Interface, Protocol, VirtualReassembly};
use vpp_types::{IpAddress, Ipv4Address, MacAddress};

/// Software interface index assigned by the dataplane.
pub type SwIfIndex = u32;

/// Marker for "no interface" in mapping and tunnel requests.
pub const NO_INTERFACE: SwIfIndex = u32::MAX;

/// Dataplane-only facts about an interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceMeta {
    pub sw_if_index: SwIfIndex,
    pub internal_name: String,
    pub tag: String,
    pub admin_up: bool,
    pub link_up: bool,
    /// Speed flags: 1=10M, 2=100M, 4=1G, 8=10G, 16=40G, 32=100G.
    pub link_speed: u8,
    /// 1=half, 2=full, 0=unknown.
    pub link_duplex: u8,
    pub link_mtu: u32,
    pub l2_address: Option<MacAddress>,
}

/// A dumped interface: its reconstructed model plus dataplane metadata.
///
/// `interface.name` is the tag, or the internal name for untagged physical
/// interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDetails {
    pub interface: Interface,
    pub meta: InterfaceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfdUdpSession {
    pub sw_if_index: SwIfIndex,
    pub source_address: IpAddress,
    pub destination_address: IpAddress,
    pub desired_min_tx_interval: u32,
    pub required_min_rx_interval: u32,
    pub detect_multiplier: u32,
    pub authentication: Option<BfdAuthentication>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StnRuleDetails {
    pub sw_if_index: SwIfIndex,
    pub ip_address: IpAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NatInterfaceDetails {
    pub sw_if_index: SwIfIndex,
    pub is_inside: bool,
    pub output_feature: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressPoolContext {
    pub first_address: Ipv4Address,
    pub last_address: Ipv4Address,
    pub vrf_id: u32,
    pub twice_nat: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nat44GlobalDetails {
    pub forwarding: bool,
    pub interfaces: Vec<NatInterfaceDetails>,
    pub address_pools: Vec<AddressPoolContext>,
    pub virtual_reassembly_ipv4: VirtualReassembly,
    pub virtual_reassembly_ipv6: VirtualReassembly,
}

/// Static mapping with a single local endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMappingContext {
    pub tag: String,
    pub address_only: bool,
    pub local_ip: Ipv4Address,
    pub local_port: u16,
    pub external_ip: Ipv4Address,
    pub external_port: u16,
    pub external_sw_if_index: SwIfIndex,
    pub protocol: Protocol,
    pub vrf_id: u32,
    pub twice_nat: bool,
    pub self_twice_nat: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalIpContext {
    pub local_ip: Ipv4Address,
    pub local_port: u16,
    pub probability: u8,
    pub vrf_id: u32,
}

/// Load-balanced static mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMappingLbContext {
    pub tag: String,
    pub external_ip: Ipv4Address,
    pub external_port: u16,
    pub protocol: Protocol,
    pub local_ips: Vec<LocalIpContext>,
    pub twice_nat: bool,
    pub self_twice_nat: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMappingContext {
    pub tag: String,
    pub address_only: bool,
    pub ip_address: Ipv4Address,
    pub port: u16,
    pub protocol: Protocol,
    pub sw_if_index: SwIfIndex,
    pub vrf_id: u32,
}

/// Every DNAT mapping the dataplane holds. Tags carry the DNAT label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nat44DNatDetails {
    pub static_mappings: Vec<StaticMappingContext>,
    pub lb_static_mappings: Vec<StaticMappingLbContext>,
    pub identity_mappings: Vec<IdentityMappingContext>,
}

/// Link state change pushed by the dataplane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceEvent {
    pub sw_if_index: SwIfIndex,
    pub admin_up: bool,
    pub link_up: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleCounterKind {
    Drop,
    Punt,
    Ipv4,
    Ipv6,
    RxNoBuf,
    RxMiss,
    RxError,
    TxError,
    Mpls,
}

impl SimpleCounterKind {
    pub fn from_raw(raw: u8) -> Option<Self> {
        let kind = match raw {
            0 => SimpleCounterKind::Drop,
            1 => SimpleCounterKind::Punt,
            2 => SimpleCounterKind::Ipv4,
            3 => SimpleCounterKind::Ipv6,
            4 => SimpleCounterKind::RxNoBuf,
            5 => SimpleCounterKind::RxMiss,
            6 => SimpleCounterKind::RxError,
            7 => SimpleCounterKind::TxError,
            8 => SimpleCounterKind::Mpls,
            _ => return None,
        };
        Some(kind)
    }
}

/// One counter for a run of consecutive interfaces starting at `first_sw_if_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCounters {
    pub kind: SimpleCounterKind,
    pub first_sw_if_index: SwIfIndex,
    pub data: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombinedCounterKind {
    Rx,
    Tx,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketsBytes {
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedCounters {
    pub kind: CombinedCounterKind,
    pub first_sw_if_index: SwIfIndex,
    pub data: Vec<PacketsBytes>,
}

/// Asynchronous messages the dataplane pushes to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataplaneNotification {
    InterfaceEvent(InterfaceEvent),
    SimpleCounters(SimpleCounters),
    CombinedCounters(CombinedCounters),
    InterfaceDetails(Box<InterfaceDetails>),
}
