//! NAT44 models: the global configuration and labelled DNAT groups.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nat44Global {
    pub forwarding: bool,
    pub nat_interfaces: Vec<NatInterface>,
    pub address_pools: Vec<AddressPool>,
    pub virtual_reassembly_ipv4: Option<VirtualReassembly>,
    pub virtual_reassembly_ipv6: Option<VirtualReassembly>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NatInterface {
    pub name: String,
    #[serde(default)]
    pub is_inside: bool,
    #[serde(default)]
    pub output_feature: bool,
}

/// A single address or an inclusive range of addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressPool {
    pub first_src_address: String,
    pub last_src_address: String,
    pub vrf_id: u32,
    pub twice_nat: bool,
}

impl AddressPool {
    /// Fills a missing bound with the other one, as the dataplane reports it.
    pub fn normalized(&self) -> AddressPool {
        let mut pool = self.clone();
        if pool.first_src_address.is_empty() {
            pool.first_src_address = pool.last_src_address.clone();
        }
        if pool.last_src_address.is_empty() {
            pool.last_src_address = pool.first_src_address.clone();
        }
        pool
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualReassembly {
    pub timeout: u32,
    pub max_reassemblies: u32,
    pub max_fragments: u32,
    pub drop_fragments: bool,
}

impl VirtualReassembly {
    /// Values the dataplane starts with.
    pub const DEFAULT: VirtualReassembly = VirtualReassembly {
        timeout: 2,
        max_reassemblies: 1024,
        max_fragments: 5,
        drop_fragments: false,
    };
}

impl Default for VirtualReassembly {
    fn default() -> Self {
        VirtualReassembly::DEFAULT
    }
}

/// A labelled group of static and identity mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DNatConfig {
    pub label: String,
    pub st_mappings: Vec<StaticMapping>,
    pub id_mappings: Vec<IdentityMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMapping {
    pub external_interface: Option<String>,
    pub external_ip: String,
    pub external_port: u16,
    pub local_ips: Vec<LocalIp>,
    pub protocol: Protocol,
    pub twice_nat: TwiceNatMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalIp {
    pub vrf_id: u32,
    pub local_ip: String,
    pub local_port: u16,
    pub probability: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityMapping {
    pub vrf_id: u32,
    pub addressed_interface: Option<String>,
    pub ip_address: String,
    pub port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    /// IP protocol number.
    pub fn number(&self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Icmp => 1,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwiceNatMode {
    #[default]
    Disabled,
    Enabled,
    #[serde(rename = "self")]
    SelfTwiceNat,
}
