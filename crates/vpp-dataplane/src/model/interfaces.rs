//! Interface models.

use serde::{Deserialize, Serialize};
use std::fmt;
use vpp_types::MacAddress;

/// A desired interface.
///
/// The link carries the type-specific part; everything else applies to every
/// interface type, although some properties are ignored for some types (MTU
/// for VXLAN, MAC for AF-Packet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub phys_address: Option<MacAddress>,
    #[serde(default)]
    pub mtu: u32,
    #[serde(default)]
    pub vrf: u32,
    #[serde(default)]
    pub set_dhcp_client: bool,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub unnumbered: Option<Unnumbered>,
    #[serde(default)]
    pub container_ip_address: Option<String>,
    #[serde(default)]
    pub rx_mode: Option<RxModeSettings>,
    pub link: InterfaceLink,
}

impl Interface {
    pub fn new(name: impl Into<String>, link: InterfaceLink) -> Self {
        Interface {
            name: name.into(),
            enabled: false,
            phys_address: None,
            mtu: 0,
            vrf: 0,
            set_dhcp_client: false,
            ip_addresses: Vec::new(),
            unnumbered: None,
            container_ip_address: None,
            rx_mode: None,
            link,
        }
    }

    pub fn kind(&self) -> InterfaceKind {
        self.link.kind()
    }

    /// Name of the interface lending its address, if this one is unnumbered.
    pub fn unnumbered_donor(&self) -> Option<&str> {
        self.unnumbered
            .as_ref()
            .map(|u| u.interface_with_ip.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Type-specific part of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterfaceLink {
    Tap(TapLink),
    Memif(MemifLink),
    Vxlan(VxlanLink),
    AfPacket(AfPacketLink),
    Loopback,
    Ethernet,
}

impl InterfaceLink {
    pub fn kind(&self) -> InterfaceKind {
        match self {
            InterfaceLink::Tap(_) => InterfaceKind::Tap,
            InterfaceLink::Memif(_) => InterfaceKind::Memif,
            InterfaceLink::Vxlan(_) => InterfaceKind::Vxlan,
            InterfaceLink::AfPacket(_) => InterfaceKind::AfPacket,
            InterfaceLink::Loopback => InterfaceKind::Loopback,
            InterfaceLink::Ethernet => InterfaceKind::Ethernet,
        }
    }
}

/// Interface type without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    Tap,
    Memif,
    Vxlan,
    AfPacket,
    Loopback,
    Ethernet,
}

impl InterfaceKind {
    /// Rx mode applied when a config stops asking for a specific one.
    pub fn default_rx_mode(&self) -> RxMode {
        match self {
            InterfaceKind::Ethernet => RxMode::Polling,
            InterfaceKind::AfPacket => RxMode::Interrupt,
            _ => RxMode::Default,
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterfaceKind::Tap => "tap",
            InterfaceKind::Memif => "memif",
            InterfaceKind::Vxlan => "vxlan",
            InterfaceKind::AfPacket => "af_packet",
            InterfaceKind::Loopback => "loopback",
            InterfaceKind::Ethernet => "ethernet",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapLink {
    pub version: u32,
    pub host_if_name: String,
    pub namespace: Option<String>,
    pub rx_ring_size: u32,
    pub tx_ring_size: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemifMode {
    #[default]
    Ethernet,
    Ip,
    PuntInject,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemifLink {
    pub master: bool,
    pub mode: MemifMode,
    pub id: u32,
    pub socket_filename: String,
    pub secret: Option<String>,
    pub ring_size: u32,
    pub buffer_size: u32,
    pub rx_queues: u32,
    pub tx_queues: u32,
}

/// VXLAN tunnel endpoint.
///
/// When `multicast` names an interface, the destination is replaced by that
/// interface's multicast address at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VxlanLink {
    pub src_address: String,
    pub dst_address: String,
    pub vni: u32,
    pub multicast: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AfPacketLink {
    pub host_if_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unnumbered {
    pub interface_with_ip: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RxMode {
    Polling,
    Interrupt,
    Adaptive,
    #[default]
    Default,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxModeSettings {
    pub rx_mode: RxMode,
    pub queue_id: u32,
    pub queue_id_valid: bool,
}

impl RxModeSettings {
    /// Settings for all queues.
    pub fn all_queues(rx_mode: RxMode) -> Self {
        RxModeSettings {
            rx_mode,
            queue_id: 0,
            queue_id_valid: false,
        }
    }
}
