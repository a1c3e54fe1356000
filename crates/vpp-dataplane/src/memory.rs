//! In-memory dataplane.
//!
//! Keeps the state a VPP instance would hold and answers dumps from it, so the
//! agent can run without a dataplane process. Every call is recorded in order
//! and any call can be made to fail by name.

use crate::api::{BfdApi, InterfaceApi, NatApi, StnApi};
use crate::error::{DataplaneError, DataplaneResult, VppRetval};
use crate::model::{
    AfPacketLink, BfdAuthKey, Interface, InterfaceLink, MemifLink, RxModeSettings, TapLink,
    Unnumbered, VirtualReassembly, VxlanLink,
};
use crate::types::{
    AddressPoolContext, BfdUdpSession, DataplaneNotification, IdentityMappingContext,
    InterfaceDetails, InterfaceEvent, InterfaceMeta, Nat44DNatDetails, Nat44GlobalDetails,
    NatInterfaceDetails, StaticMappingContext, StaticMappingLbContext, StnRuleDetails, SwIfIndex,
    NO_INTERFACE,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::Ipv6Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;
use vpp_types::{IpAddress, IpPrefix, Ipv6Address, MacAddress};

/// Socket registered by the dataplane at startup under id 0.
pub const DEFAULT_MEMIF_SOCKET: &str = "/run/vpp/memif.sock";

/// MTU reported for interfaces nobody configured an MTU on.
pub const DEFAULT_LINK_MTU: u32 = 9000;

/// A recorded handler call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataplaneCall {
    pub name: &'static str,
    pub detail: String,
}

impl DataplaneCall {
    /// Returns false for dumps and queries.
    pub fn is_mutating(&self) -> bool {
        !(self.name.contains("dump") || self.name.starts_with("get_"))
    }
}

#[derive(Debug, Clone)]
struct SimInterface {
    internal_name: String,
    tag: String,
    link: InterfaceLink,
    admin_up: bool,
    mac: Option<MacAddress>,
    mtu: u32,
    vrf: u32,
    vrf_ipv6: u32,
    ips: Vec<IpPrefix>,
    dhcp: bool,
    container_ip: Option<IpPrefix>,
    unnumbered: Option<SwIfIndex>,
    rx_mode: Option<RxModeSettings>,
    multicast_if: Option<SwIfIndex>,
}

impl SimInterface {
    fn new(internal_name: String, link: InterfaceLink) -> Self {
        SimInterface {
            internal_name,
            tag: String::new(),
            link,
            admin_up: false,
            mac: None,
            mtu: DEFAULT_LINK_MTU,
            vrf: 0,
            vrf_ipv6: 0,
            ips: Vec::new(),
            dhcp: false,
            container_ip: None,
            unnumbered: None,
            rx_mode: None,
            multicast_if: None,
        }
    }

    fn is_physical(&self) -> bool {
        matches!(self.link, InterfaceLink::Ethernet)
    }
}

#[derive(Debug)]
struct State {
    next_index: SwIfIndex,
    tap_count: u32,
    vxlan_count: u32,
    loop_count: u32,
    interfaces: BTreeMap<SwIfIndex, SimInterface>,
    memif_sockets: BTreeMap<u32, String>,
    vrfs: BTreeSet<u32>,
    vrfs_ipv6: BTreeSet<u32>,
    bfd_sessions: Vec<BfdUdpSession>,
    bfd_keys: BTreeMap<u32, BfdAuthKey>,
    bfd_echo_source: Option<SwIfIndex>,
    nat_forwarding: bool,
    nat_interfaces: Vec<NatInterfaceDetails>,
    nat_pools: Vec<AddressPoolContext>,
    reassembly_ipv4: VirtualReassembly,
    reassembly_ipv6: VirtualReassembly,
    static_mappings: Vec<StaticMappingContext>,
    lb_static_mappings: Vec<StaticMappingLbContext>,
    identity_mappings: Vec<IdentityMappingContext>,
    stn_rules: Vec<StnRuleDetails>,
    calls: Vec<DataplaneCall>,
    failing: HashSet<String>,
    notifications: Vec<DataplaneNotification>,
}

impl State {
    fn new() -> Self {
        let mut interfaces = BTreeMap::new();
        interfaces.insert(
            0,
            SimInterface::new("local0".to_string(), InterfaceLink::Ethernet),
        );
        let mut memif_sockets = BTreeMap::new();
        memif_sockets.insert(0, DEFAULT_MEMIF_SOCKET.to_string());

        State {
            next_index: 1,
            tap_count: 0,
            vxlan_count: 0,
            loop_count: 0,
            interfaces,
            memif_sockets,
            vrfs: BTreeSet::from([0]),
            vrfs_ipv6: BTreeSet::from([0]),
            bfd_sessions: Vec::new(),
            bfd_keys: BTreeMap::new(),
            bfd_echo_source: None,
            nat_forwarding: false,
            nat_interfaces: Vec::new(),
            nat_pools: Vec::new(),
            reassembly_ipv4: VirtualReassembly::DEFAULT,
            reassembly_ipv6: VirtualReassembly::DEFAULT,
            static_mappings: Vec::new(),
            lb_static_mappings: Vec::new(),
            identity_mappings: Vec::new(),
            stn_rules: Vec::new(),
            calls: Vec::new(),
            failing: HashSet::new(),
            notifications: Vec::new(),
        }
    }

    fn record(&mut self, name: &'static str, detail: String) -> DataplaneResult<()> {
        trace!(call = name, "{}", detail);
        self.calls.push(DataplaneCall { name, detail });
        if self.failing.contains(name) {
            return Err(DataplaneError::retval(name, VppRetval::Unspecified));
        }
        Ok(())
    }

    fn interface_mut(
        &mut self,
        call: &'static str,
        sw_if_index: SwIfIndex,
    ) -> DataplaneResult<&mut SimInterface> {
        self.interfaces
            .get_mut(&sw_if_index)
            .ok_or_else(|| DataplaneError::retval(call, VppRetval::InvalidSwIfIndex))
    }

    fn insert_interface(&mut self, iface: SimInterface) -> SwIfIndex {
        let sw_if_index = self.next_index;
        self.next_index += 1;
        let mut iface = iface;
        if iface.mac.is_none() {
            iface.mac = Some(generated_mac(sw_if_index));
        }
        self.interfaces.insert(sw_if_index, iface);
        sw_if_index
    }

    fn remove_interface(
        &mut self,
        call: &'static str,
        sw_if_index: SwIfIndex,
    ) -> DataplaneResult<SimInterface> {
        let iface = self
            .interfaces
            .remove(&sw_if_index)
            .ok_or_else(|| DataplaneError::retval(call, VppRetval::InvalidSwIfIndex))?;
        self.notifications
            .push(DataplaneNotification::InterfaceEvent(InterfaceEvent {
                sw_if_index,
                admin_up: false,
                link_up: false,
                deleted: true,
            }));
        Ok(iface)
    }

    fn push_link_event(&mut self, sw_if_index: SwIfIndex, admin_up: bool) {
        self.notifications
            .push(DataplaneNotification::InterfaceEvent(InterfaceEvent {
                sw_if_index,
                admin_up,
                link_up: admin_up,
                deleted: false,
            }));
    }

    fn tag_of(&self, sw_if_index: SwIfIndex) -> Option<String> {
        self.interfaces.get(&sw_if_index).map(|iface| iface.tag.clone())
    }

    fn socket_id(&self, filename: &str) -> Option<u32> {
        self.memif_sockets
            .iter()
            .find(|(_, name)| name.as_str() == filename)
            .map(|(id, _)| *id)
    }

    fn details(&self, sw_if_index: SwIfIndex, sim: &SimInterface) -> InterfaceDetails {
        let name = if sim.tag.is_empty() && sim.is_physical() {
            sim.internal_name.clone()
        } else {
            sim.tag.clone()
        };

        let mut link = sim.link.clone();
        match &mut link {
            InterfaceLink::Memif(memif) => {
                memif.secret = None;
                memif.ring_size = 0;
                memif.buffer_size = 0;
            }
            InterfaceLink::Vxlan(vxlan) => {
                vxlan.multicast = sim
                    .multicast_if
                    .and_then(|idx| self.tag_of(idx))
                    .filter(|tag| !tag.is_empty());
            }
            _ => {}
        }

        let unnumbered = sim.unnumbered.and_then(|donor| {
            self.tag_of(donor).map(|tag| Unnumbered {
                interface_with_ip: tag,
            })
        });
        let ip_addresses = if sim.unnumbered.is_some() {
            Vec::new()
        } else {
            sim.ips.iter().map(|ip| ip.to_string()).collect()
        };

        let interface = Interface {
            name,
            enabled: sim.admin_up,
            phys_address: sim.mac,
            mtu: sim.mtu,
            vrf: sim.vrf,
            set_dhcp_client: sim.dhcp,
            ip_addresses,
            unnumbered,
            container_ip_address: sim.container_ip.map(|ip| ip.to_string()),
            rx_mode: sim.rx_mode,
            link,
        };
        let (link_speed, link_duplex) = if sim.is_physical() { (8, 2) } else { (0, 0) };
        let meta = InterfaceMeta {
            sw_if_index,
            internal_name: sim.internal_name.clone(),
            tag: sim.tag.clone(),
            admin_up: sim.admin_up,
            link_up: sim.admin_up,
            link_speed,
            link_duplex,
            link_mtu: sim.mtu,
            l2_address: sim.mac,
        };
        InterfaceDetails { interface, meta }
    }
}

fn generated_mac(sw_if_index: SwIfIndex) -> MacAddress {
    let [_, b, c, d] = sw_if_index.to_be_bytes();
    MacAddress::new([0x02, 0xfe, 0x00, b, c, d])
}

fn link_local_for(sw_if_index: SwIfIndex) -> Option<IpPrefix> {
    let host = u16::try_from(sw_if_index).unwrap_or(u16::MAX);
    let address = Ipv6Address::from(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, host));
    IpPrefix::new(IpAddress::V6(address), 64).ok()
}

fn same_static_mapping(a: &StaticMappingContext, b: &StaticMappingContext) -> bool {
    a.local_ip == b.local_ip
        && a.local_port == b.local_port
        && a.external_ip == b.external_ip
        && a.external_port == b.external_port
        && a.external_sw_if_index == b.external_sw_if_index
        && a.protocol == b.protocol
        && a.vrf_id == b.vrf_id
}

/// A dataplane that lives in process memory.
#[derive(Debug)]
pub struct InMemoryDataplane {
    state: Mutex<State>,
}

impl Default for InMemoryDataplane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDataplane {
    /// Creates a dataplane holding only `local0` and the default memif socket.
    pub fn new() -> Self {
        InMemoryDataplane {
            state: Mutex::new(State::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an untagged physical NIC.
    pub fn add_physical_interface(&self, internal_name: &str, mac: Option<MacAddress>) -> SwIfIndex {
        let mut state = self.lock();
        let mut sim = SimInterface::new(internal_name.to_string(), InterfaceLink::Ethernet);
        sim.mac = mac;
        state.insert_interface(sim)
    }

    /// Seeds an interface as if an earlier agent run had created it.
    ///
    /// An empty `tag` leaves the interface untagged. Unnumbered and VXLAN
    /// multicast references are not seeded.
    pub fn seed_interface(&self, tag: &str, interface: &Interface) -> SwIfIndex {
        let mut state = self.lock();
        let internal_name = match &interface.link {
            InterfaceLink::Tap(_) => {
                state.tap_count += 1;
                format!("tap{}", state.tap_count - 1)
            }
            InterfaceLink::Memif(memif) => {
                let socket_id = match state.socket_id(&memif.socket_filename) {
                    Some(id) => id,
                    None => {
                        let id = state.memif_sockets.len() as u32;
                        state.memif_sockets.insert(id, memif.socket_filename.clone());
                        id
                    }
                };
                format!("memif{}/{}", socket_id, memif.id)
            }
            InterfaceLink::Vxlan(_) => {
                state.vxlan_count += 1;
                format!("vxlan_tunnel{}", state.vxlan_count - 1)
            }
            InterfaceLink::AfPacket(afpacket) => format!("host-{}", afpacket.host_if_name),
            InterfaceLink::Loopback => {
                state.loop_count += 1;
                format!("loop{}", state.loop_count - 1)
            }
            InterfaceLink::Ethernet => interface.name.clone(),
        };

        let mut sim = SimInterface::new(internal_name, interface.link.clone());
        sim.tag = tag.to_string();
        sim.admin_up = interface.enabled;
        sim.mac = interface.phys_address;
        if interface.mtu != 0 {
            sim.mtu = interface.mtu;
        }
        sim.vrf = interface.vrf;
        sim.dhcp = interface.set_dhcp_client;
        sim.ips = interface
            .ip_addresses
            .iter()
            .filter_map(|ip| ip.parse().ok())
            .collect();
        sim.container_ip = interface
            .container_ip_address
            .as_deref()
            .and_then(|ip| ip.parse().ok());
        sim.rx_mode = interface.rx_mode;
        state.vrfs.insert(interface.vrf);
        state.insert_interface(sim)
    }

    pub fn seed_bfd_session(&self, session: BfdUdpSession) {
        self.lock().bfd_sessions.push(session);
    }

    pub fn seed_bfd_auth_key(&self, key: BfdAuthKey) {
        self.lock().bfd_keys.insert(key.id, key);
    }

    pub fn seed_stn_rule(&self, rule: StnRuleDetails) {
        self.lock().stn_rules.push(rule);
    }

    pub fn seed_nat_interface(&self, nat_interface: NatInterfaceDetails) {
        self.lock().nat_interfaces.push(nat_interface);
    }

    pub fn seed_address_pool(&self, pool: AddressPoolContext) {
        self.lock().nat_pools.push(pool);
    }

    pub fn seed_static_mapping(&self, mapping: StaticMappingContext) {
        self.lock().static_mappings.push(mapping);
    }

    pub fn seed_lb_static_mapping(&self, mapping: StaticMappingLbContext) {
        self.lock().lb_static_mappings.push(mapping);
    }

    pub fn seed_identity_mapping(&self, mapping: IdentityMappingContext) {
        self.lock().identity_mappings.push(mapping);
    }

    /// Makes every later call named `name` fail with an unspecified retval.
    pub fn fail_call(&self, name: &str) {
        self.lock().failing.insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    pub fn calls(&self) -> Vec<DataplaneCall> {
        self.lock().calls.clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.lock().calls.iter().map(|call| call.name).collect()
    }

    /// Recorded calls that change dataplane state.
    pub fn mutating_calls(&self) -> Vec<DataplaneCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_mutating())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Drains notifications produced by state changes since the last call.
    pub fn take_notifications(&self) -> Vec<DataplaneNotification> {
        std::mem::take(&mut self.lock().notifications)
    }

    /// Current details of one interface, without recording a call.
    pub fn interface_details(&self, sw_if_index: SwIfIndex) -> Option<InterfaceDetails> {
        let state = self.lock();
        state
            .interfaces
            .get(&sw_if_index)
            .map(|sim| state.details(sw_if_index, sim))
    }

    /// Index of the interface carrying `tag`, without recording a call.
    pub fn find_by_tag(&self, tag: &str) -> Option<SwIfIndex> {
        self.lock()
            .interfaces
            .iter()
            .find(|(_, sim)| sim.tag == tag)
            .map(|(idx, _)| *idx)
    }

    pub fn interface_count(&self) -> usize {
        self.lock().interfaces.len()
    }

    pub fn stn_rules(&self) -> Vec<StnRuleDetails> {
        self.lock().stn_rules.clone()
    }

    pub fn bfd_sessions(&self) -> Vec<BfdUdpSession> {
        self.lock().bfd_sessions.clone()
    }

    pub fn static_mappings(&self) -> Vec<StaticMappingContext> {
        self.lock().static_mappings.clone()
    }

    pub fn identity_mappings(&self) -> Vec<IdentityMappingContext> {
        self.lock().identity_mappings.clone()
    }
}

impl InterfaceApi for InMemoryDataplane {
    fn add_tap_interface(&self, name: &str, tap: &TapLink) -> DataplaneResult<SwIfIndex> {
        let mut state = self.lock();
        state.record("add_tap_interface", format!("{} host={}", name, tap.host_if_name))?;
        state.tap_count += 1;
        let internal_name = format!("tap{}", state.tap_count - 1);
        let mut sim = SimInterface::new(internal_name, InterfaceLink::Tap(tap.clone()));
        sim.tag = name.to_string();
        Ok(state.insert_interface(sim))
    }

    fn delete_tap_interface(&self, name: &str, sw_if_index: SwIfIndex, version: u32) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("delete_tap_interface", format!("{} idx={} v{}", name, sw_if_index, version))?;
        state.remove_interface("delete_tap_interface", sw_if_index)?;
        Ok(())
    }

    fn register_memif_socket_filename(&self, filename: &str, socket_id: u32) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("register_memif_socket_filename", format!("{} id={}", filename, socket_id))?;
        if state.memif_sockets.contains_key(&socket_id) {
            return Err(DataplaneError::retval(
                "register_memif_socket_filename",
                VppRetval::InvalidValue,
            ));
        }
        state.memif_sockets.insert(socket_id, filename.to_string());
        Ok(())
    }

    fn add_memif_interface(&self, name: &str, memif: &MemifLink, socket_id: u32) -> DataplaneResult<SwIfIndex> {
        let mut state = self.lock();
        state.record("add_memif_interface", format!("{} socket={} id={}", name, socket_id, memif.id))?;
        let filename = state
            .memif_sockets
            .get(&socket_id)
            .cloned()
            .ok_or_else(|| DataplaneError::retval("add_memif_interface", VppRetval::NoSuchEntry))?;
        let mut link = memif.clone();
        link.socket_filename = filename;
        let internal_name = format!("memif{}/{}", socket_id, memif.id);
        let mut sim = SimInterface::new(internal_name, InterfaceLink::Memif(link));
        sim.tag = name.to_string();
        Ok(state.insert_interface(sim))
    }

    fn delete_memif_interface(&self, name: &str, sw_if_index: SwIfIndex) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("delete_memif_interface", format!("{} idx={}", name, sw_if_index))?;
        state.remove_interface("delete_memif_interface", sw_if_index)?;
        Ok(())
    }

    fn add_vxlan_tunnel(
        &self,
        name: &str,
        vrf: u32,
        multicast_if: SwIfIndex,
        vxlan: &VxlanLink,
    ) -> DataplaneResult<SwIfIndex> {
        let mut state = self.lock();
        state.record(
            "add_vxlan_tunnel",
            format!("{} {}->{} vni={}", name, vxlan.src_address, vxlan.dst_address, vxlan.vni),
        )?;
        if multicast_if != NO_INTERFACE && !state.interfaces.contains_key(&multicast_if) {
            return Err(DataplaneError::retval("add_vxlan_tunnel", VppRetval::InvalidSwIfIndex));
        }
        if !state.vrfs.contains(&vrf) {
            return Err(DataplaneError::retval("add_vxlan_tunnel", VppRetval::NoSuchFib));
        }
        state.vxlan_count += 1;
        let internal_name = format!("vxlan_tunnel{}", state.vxlan_count - 1);
        let mut sim = SimInterface::new(internal_name, InterfaceLink::Vxlan(vxlan.clone()));
        sim.tag = name.to_string();
        sim.vrf = vrf;
        sim.multicast_if = (multicast_if != NO_INTERFACE).then_some(multicast_if);
        Ok(state.insert_interface(sim))
    }

    fn delete_vxlan_tunnel(
        &self,
        name: &str,
        sw_if_index: SwIfIndex,
        vrf: u32,
        vxlan: &VxlanLink,
    ) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "delete_vxlan_tunnel",
            format!("{} idx={} vrf={} vni={}", name, sw_if_index, vrf, vxlan.vni),
        )?;
        state.remove_interface("delete_vxlan_tunnel", sw_if_index)?;
        Ok(())
    }

    fn add_loopback_interface(&self, name: &str) -> DataplaneResult<SwIfIndex> {
        let mut state = self.lock();
        state.record("add_loopback_interface", name.to_string())?;
        state.loop_count += 1;
        let internal_name = format!("loop{}", state.loop_count - 1);
        let mut sim = SimInterface::new(internal_name, InterfaceLink::Loopback);
        sim.tag = name.to_string();
        Ok(state.insert_interface(sim))
    }

    fn delete_loopback_interface(&self, name: &str, sw_if_index: SwIfIndex) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("delete_loopback_interface", format!("{} idx={}", name, sw_if_index))?;
        state.remove_interface("delete_loopback_interface", sw_if_index)?;
        Ok(())
    }

    fn add_af_packet_interface(
        &self,
        name: &str,
        mac: Option<&MacAddress>,
        afpacket: &AfPacketLink,
    ) -> DataplaneResult<SwIfIndex> {
        let mut state = self.lock();
        state.record("add_af_packet_interface", format!("{} host={}", name, afpacket.host_if_name))?;
        let internal_name = format!("host-{}", afpacket.host_if_name);
        if state
            .interfaces
            .values()
            .any(|iface| iface.internal_name == internal_name)
        {
            return Err(DataplaneError::retval("add_af_packet_interface", VppRetval::InvalidValue));
        }
        let mut sim = SimInterface::new(internal_name, InterfaceLink::AfPacket(afpacket.clone()));
        sim.tag = name.to_string();
        sim.mac = mac.copied();
        Ok(state.insert_interface(sim))
    }

    fn delete_af_packet_interface(
        &self,
        name: &str,
        sw_if_index: SwIfIndex,
        afpacket: &AfPacketLink,
    ) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "delete_af_packet_interface",
            format!("{} idx={} host={}", name, sw_if_index, afpacket.host_if_name),
        )?;
        state.remove_interface("delete_af_packet_interface", sw_if_index)?;
        Ok(())
    }

    fn interface_admin_up(&self, sw_if_index: SwIfIndex) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("interface_admin_up", format!("idx={}", sw_if_index))?;
        state.interface_mut("interface_admin_up", sw_if_index)?.admin_up = true;
        state.push_link_event(sw_if_index, true);
        Ok(())
    }

    fn interface_admin_down(&self, sw_if_index: SwIfIndex) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("interface_admin_down", format!("idx={}", sw_if_index))?;
        state.interface_mut("interface_admin_down", sw_if_index)?.admin_up = false;
        state.push_link_event(sw_if_index, false);
        Ok(())
    }

    fn set_interface_tag(&self, tag: &str, sw_if_index: SwIfIndex) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_interface_tag", format!("{} idx={}", tag, sw_if_index))?;
        state.interface_mut("set_interface_tag", sw_if_index)?.tag = tag.to_string();
        Ok(())
    }

    fn remove_interface_tag(&self, tag: &str, sw_if_index: SwIfIndex) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("remove_interface_tag", format!("{} idx={}", tag, sw_if_index))?;
        state.interface_mut("remove_interface_tag", sw_if_index)?.tag.clear();
        Ok(())
    }

    fn set_interface_as_dhcp_client(&self, sw_if_index: SwIfIndex, hostname: &str) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_interface_as_dhcp_client", format!("idx={} host={}", sw_if_index, hostname))?;
        state.interface_mut("set_interface_as_dhcp_client", sw_if_index)?.dhcp = true;
        Ok(())
    }

    fn unset_interface_as_dhcp_client(&self, sw_if_index: SwIfIndex, hostname: &str) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("unset_interface_as_dhcp_client", format!("idx={} host={}", sw_if_index, hostname))?;
        state.interface_mut("unset_interface_as_dhcp_client", sw_if_index)?.dhcp = false;
        Ok(())
    }

    fn add_container_ip(&self, sw_if_index: SwIfIndex, address: &IpPrefix) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("add_container_ip", format!("idx={} {}", sw_if_index, address))?;
        state.interface_mut("add_container_ip", sw_if_index)?.container_ip = Some(*address);
        Ok(())
    }

    fn del_container_ip(&self, sw_if_index: SwIfIndex, address: &IpPrefix) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("del_container_ip", format!("idx={} {}", sw_if_index, address))?;
        let iface = state.interface_mut("del_container_ip", sw_if_index)?;
        if iface.container_ip.as_ref() != Some(address) {
            return Err(DataplaneError::retval("del_container_ip", VppRetval::NoSuchEntry));
        }
        iface.container_ip = None;
        Ok(())
    }

    fn add_interface_ip(&self, sw_if_index: SwIfIndex, address: &IpPrefix) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("add_interface_ip", format!("idx={} {}", sw_if_index, address))?;
        let iface = state.interface_mut("add_interface_ip", sw_if_index)?;
        if iface.ips.contains(address) {
            return Err(DataplaneError::retval("add_interface_ip", VppRetval::InvalidValue));
        }
        if address.is_ipv6() && !iface.ips.iter().any(IpPrefix::is_link_local) {
            iface.ips.extend(link_local_for(sw_if_index));
        }
        iface.ips.push(*address);
        Ok(())
    }

    fn del_interface_ip(&self, sw_if_index: SwIfIndex, address: &IpPrefix) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("del_interface_ip", format!("idx={} {}", sw_if_index, address))?;
        let iface = state.interface_mut("del_interface_ip", sw_if_index)?;
        let before = iface.ips.len();
        iface.ips.retain(|ip| ip != address);
        if iface.ips.len() == before {
            return Err(DataplaneError::retval("del_interface_ip", VppRetval::NoSuchEntry));
        }
        Ok(())
    }

    fn set_unnumbered_ip(&self, sw_if_index: SwIfIndex, donor: SwIfIndex) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_unnumbered_ip", format!("idx={} donor={}", sw_if_index, donor))?;
        if !state.interfaces.contains_key(&donor) {
            return Err(DataplaneError::retval("set_unnumbered_ip", VppRetval::InvalidSwIfIndex));
        }
        state.interface_mut("set_unnumbered_ip", sw_if_index)?.unnumbered = Some(donor);
        Ok(())
    }

    fn unset_unnumbered_ip(&self, sw_if_index: SwIfIndex) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("unset_unnumbered_ip", format!("idx={}", sw_if_index))?;
        state.interface_mut("unset_unnumbered_ip", sw_if_index)?.unnumbered = None;
        Ok(())
    }

    fn set_interface_mac(&self, sw_if_index: SwIfIndex, mac: &MacAddress) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_interface_mac", format!("idx={} {}", sw_if_index, mac))?;
        state.interface_mut("set_interface_mac", sw_if_index)?.mac = Some(*mac);
        Ok(())
    }

    fn set_interface_mtu(&self, sw_if_index: SwIfIndex, mtu: u32) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_interface_mtu", format!("idx={} mtu={}", sw_if_index, mtu))?;
        state.interface_mut("set_interface_mtu", sw_if_index)?.mtu = mtu;
        Ok(())
    }

    fn set_rx_mode(&self, sw_if_index: SwIfIndex, rx_mode: &RxModeSettings) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_rx_mode", format!("idx={} {:?}", sw_if_index, rx_mode.rx_mode))?;
        state.interface_mut("set_rx_mode", sw_if_index)?.rx_mode = Some(*rx_mode);
        Ok(())
    }

    fn create_vrf(&self, vrf: u32) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("create_vrf", format!("vrf={}", vrf))?;
        state.vrfs.insert(vrf);
        Ok(())
    }

    fn create_vrf_ipv6(&self, vrf: u32) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("create_vrf_ipv6", format!("vrf={}", vrf))?;
        state.vrfs_ipv6.insert(vrf);
        Ok(())
    }

    fn set_interface_vrf(&self, sw_if_index: SwIfIndex, vrf: u32) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_interface_vrf", format!("idx={} vrf={}", sw_if_index, vrf))?;
        if !state.vrfs.contains(&vrf) {
            return Err(DataplaneError::retval("set_interface_vrf", VppRetval::NoSuchFib));
        }
        state.interface_mut("set_interface_vrf", sw_if_index)?.vrf = vrf;
        Ok(())
    }

    fn set_interface_vrf_ipv6(&self, sw_if_index: SwIfIndex, vrf: u32) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_interface_vrf_ipv6", format!("idx={} vrf={}", sw_if_index, vrf))?;
        if !state.vrfs_ipv6.contains(&vrf) {
            return Err(DataplaneError::retval("set_interface_vrf_ipv6", VppRetval::NoSuchFib));
        }
        state.interface_mut("set_interface_vrf_ipv6", sw_if_index)?.vrf_ipv6 = vrf;
        Ok(())
    }

    fn dump_interfaces(&self) -> DataplaneResult<BTreeMap<SwIfIndex, InterfaceDetails>> {
        let mut state = self.lock();
        state.record("dump_interfaces", String::new())?;
        Ok(state
            .interfaces
            .iter()
            .map(|(idx, sim)| (*idx, state.details(*idx, sim)))
            .collect())
    }

    fn dump_memif_socket_details(&self) -> DataplaneResult<HashMap<String, u32>> {
        let mut state = self.lock();
        state.record("dump_memif_socket_details", String::new())?;
        Ok(state
            .memif_sockets
            .iter()
            .map(|(id, filename)| (filename.clone(), *id))
            .collect())
    }
}

impl BfdApi for InMemoryDataplane {
    fn add_bfd_udp_session(&self, session: &BfdUdpSession) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "add_bfd_udp_session",
            format!(
                "idx={} {}->{}",
                session.sw_if_index, session.source_address, session.destination_address
            ),
        )?;
        if !state.interfaces.contains_key(&session.sw_if_index) {
            return Err(DataplaneError::retval("add_bfd_udp_session", VppRetval::InvalidSwIfIndex));
        }
        if let Some(auth) = &session.authentication {
            if !state.bfd_keys.contains_key(&auth.key_id) {
                return Err(DataplaneError::retval("add_bfd_udp_session", VppRetval::NoSuchEntry));
            }
        }
        if state.bfd_sessions.iter().any(|s| {
            s.sw_if_index == session.sw_if_index
                && s.source_address == session.source_address
                && s.destination_address == session.destination_address
        }) {
            return Err(DataplaneError::retval("add_bfd_udp_session", VppRetval::InvalidValue));
        }
        state.bfd_sessions.push(session.clone());
        Ok(())
    }

    fn modify_bfd_udp_session(&self, session: &BfdUdpSession) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "modify_bfd_udp_session",
            format!(
                "idx={} {}->{}",
                session.sw_if_index, session.source_address, session.destination_address
            ),
        )?;
        let existing = state
            .bfd_sessions
            .iter_mut()
            .find(|s| {
                s.sw_if_index == session.sw_if_index
                    && s.source_address == session.source_address
                    && s.destination_address == session.destination_address
            })
            .ok_or_else(|| DataplaneError::retval("modify_bfd_udp_session", VppRetval::NoSuchEntry))?;
        existing.desired_min_tx_interval = session.desired_min_tx_interval;
        existing.required_min_rx_interval = session.required_min_rx_interval;
        existing.detect_multiplier = session.detect_multiplier;
        Ok(())
    }

    fn delete_bfd_udp_session(
        &self,
        sw_if_index: SwIfIndex,
        source: &IpAddress,
        destination: &IpAddress,
    ) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "delete_bfd_udp_session",
            format!("idx={} {}->{}", sw_if_index, source, destination),
        )?;
        let before = state.bfd_sessions.len();
        state.bfd_sessions.retain(|s| {
            !(s.sw_if_index == sw_if_index
                && s.source_address == *source
                && s.destination_address == *destination)
        });
        if state.bfd_sessions.len() == before {
            return Err(DataplaneError::retval("delete_bfd_udp_session", VppRetval::NoSuchEntry));
        }
        Ok(())
    }

    fn dump_bfd_sessions(&self) -> DataplaneResult<Vec<BfdUdpSession>> {
        let mut state = self.lock();
        state.record("dump_bfd_sessions", String::new())?;
        Ok(state.bfd_sessions.clone())
    }

    fn set_bfd_udp_auth_key(&self, key: &BfdAuthKey) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_bfd_udp_auth_key", format!("id={}", key.id))?;
        state.bfd_keys.insert(key.id, key.clone());
        Ok(())
    }

    fn delete_bfd_udp_auth_key(&self, key: &BfdAuthKey) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("delete_bfd_udp_auth_key", format!("id={}", key.id))?;
        let in_use = state
            .bfd_sessions
            .iter()
            .any(|s| s.authentication.map(|auth| auth.key_id) == Some(key.id));
        if in_use {
            return Err(DataplaneError::retval("delete_bfd_udp_auth_key", VppRetval::InvalidValue));
        }
        state
            .bfd_keys
            .remove(&key.id)
            .ok_or_else(|| DataplaneError::retval("delete_bfd_udp_auth_key", VppRetval::NoSuchEntry))?;
        Ok(())
    }

    fn dump_bfd_auth_keys(&self) -> DataplaneResult<Vec<BfdAuthKey>> {
        let mut state = self.lock();
        state.record("dump_bfd_auth_keys", String::new())?;
        Ok(state
            .bfd_keys
            .values()
            .map(|key| BfdAuthKey {
                name: String::new(),
                id: key.id,
                authentication_type: key.authentication_type,
                secret: String::new(),
            })
            .collect())
    }

    fn add_bfd_echo_function(&self, sw_if_index: SwIfIndex) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("add_bfd_echo_function", format!("idx={}", sw_if_index))?;
        if !state.interfaces.contains_key(&sw_if_index) {
            return Err(DataplaneError::retval("add_bfd_echo_function", VppRetval::InvalidSwIfIndex));
        }
        state.bfd_echo_source = Some(sw_if_index);
        Ok(())
    }

    fn delete_bfd_echo_function(&self) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("delete_bfd_echo_function", String::new())?;
        state.bfd_echo_source = None;
        Ok(())
    }

    fn get_bfd_echo_source(&self) -> DataplaneResult<Option<SwIfIndex>> {
        let mut state = self.lock();
        state.record("get_bfd_echo_source", String::new())?;
        Ok(state.bfd_echo_source)
    }
}

impl NatApi for InMemoryDataplane {
    fn set_nat44_forwarding(&self, enabled: bool) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_nat44_forwarding", format!("enabled={}", enabled))?;
        state.nat_forwarding = enabled;
        Ok(())
    }

    fn enable_nat44_interface(&self, sw_if_index: SwIfIndex, is_inside: bool) -> DataplaneResult<()> {
        enable_feature(self, "enable_nat44_interface", sw_if_index, is_inside, false)
    }

    fn disable_nat44_interface(&self, sw_if_index: SwIfIndex, is_inside: bool) -> DataplaneResult<()> {
        disable_feature(self, "disable_nat44_interface", sw_if_index, is_inside, false)
    }

    fn enable_nat44_interface_output(&self, sw_if_index: SwIfIndex, is_inside: bool) -> DataplaneResult<()> {
        enable_feature(self, "enable_nat44_interface_output", sw_if_index, is_inside, true)
    }

    fn disable_nat44_interface_output(&self, sw_if_index: SwIfIndex, is_inside: bool) -> DataplaneResult<()> {
        disable_feature(self, "disable_nat44_interface_output", sw_if_index, is_inside, true)
    }

    fn add_nat44_address_pool(&self, pool: &AddressPoolContext) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "add_nat44_address_pool",
            format!("{}-{} vrf={}", pool.first_address, pool.last_address, pool.vrf_id),
        )?;
        if state.nat_pools.contains(pool) {
            return Err(DataplaneError::retval("add_nat44_address_pool", VppRetval::InvalidValue));
        }
        state.nat_pools.push(*pool);
        Ok(())
    }

    fn del_nat44_address_pool(&self, pool: &AddressPoolContext) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "del_nat44_address_pool",
            format!("{}-{} vrf={}", pool.first_address, pool.last_address, pool.vrf_id),
        )?;
        let position = state
            .nat_pools
            .iter()
            .position(|p| p == pool)
            .ok_or_else(|| DataplaneError::retval("del_nat44_address_pool", VppRetval::NoSuchEntry))?;
        state.nat_pools.remove(position);
        Ok(())
    }

    fn set_virtual_reassembly_ipv4(&self, reassembly: &VirtualReassembly) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_virtual_reassembly_ipv4", format!("{:?}", reassembly))?;
        state.reassembly_ipv4 = *reassembly;
        Ok(())
    }

    fn set_virtual_reassembly_ipv6(&self, reassembly: &VirtualReassembly) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("set_virtual_reassembly_ipv6", format!("{:?}", reassembly))?;
        state.reassembly_ipv6 = *reassembly;
        Ok(())
    }

    fn add_nat44_static_mapping(&self, ctx: &StaticMappingContext) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "add_nat44_static_mapping",
            format!("{} {}:{} -> {}:{}", ctx.tag, ctx.external_ip, ctx.external_port, ctx.local_ip, ctx.local_port),
        )?;
        if state.static_mappings.iter().any(|m| same_static_mapping(m, ctx)) {
            return Err(DataplaneError::retval("add_nat44_static_mapping", VppRetval::InvalidValue));
        }
        state.static_mappings.push(ctx.clone());
        Ok(())
    }

    fn del_nat44_static_mapping(&self, ctx: &StaticMappingContext) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "del_nat44_static_mapping",
            format!("{} {}:{} -> {}:{}", ctx.tag, ctx.external_ip, ctx.external_port, ctx.local_ip, ctx.local_port),
        )?;
        let position = state
            .static_mappings
            .iter()
            .position(|m| same_static_mapping(m, ctx))
            .ok_or_else(|| DataplaneError::retval("del_nat44_static_mapping", VppRetval::NoSuchEntry))?;
        state.static_mappings.remove(position);
        Ok(())
    }

    fn add_nat44_static_mapping_lb(&self, ctx: &StaticMappingLbContext) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "add_nat44_static_mapping_lb",
            format!("{} {}:{} locals={}", ctx.tag, ctx.external_ip, ctx.external_port, ctx.local_ips.len()),
        )?;
        state.lb_static_mappings.push(ctx.clone());
        Ok(())
    }

    fn del_nat44_static_mapping_lb(&self, ctx: &StaticMappingLbContext) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "del_nat44_static_mapping_lb",
            format!("{} {}:{}", ctx.tag, ctx.external_ip, ctx.external_port),
        )?;
        let position = state
            .lb_static_mappings
            .iter()
            .position(|m| {
                m.external_ip == ctx.external_ip
                    && m.external_port == ctx.external_port
                    && m.protocol == ctx.protocol
            })
            .ok_or_else(|| DataplaneError::retval("del_nat44_static_mapping_lb", VppRetval::NoSuchEntry))?;
        state.lb_static_mappings.remove(position);
        Ok(())
    }

    fn add_nat44_identity_mapping(&self, ctx: &IdentityMappingContext) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "add_nat44_identity_mapping",
            format!("{} {}:{} idx={}", ctx.tag, ctx.ip_address, ctx.port, ctx.sw_if_index),
        )?;
        state.identity_mappings.push(ctx.clone());
        Ok(())
    }

    fn del_nat44_identity_mapping(&self, ctx: &IdentityMappingContext) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record(
            "del_nat44_identity_mapping",
            format!("{} {}:{} idx={}", ctx.tag, ctx.ip_address, ctx.port, ctx.sw_if_index),
        )?;
        let position = state
            .identity_mappings
            .iter()
            .position(|m| {
                m.ip_address == ctx.ip_address
                    && m.port == ctx.port
                    && m.protocol == ctx.protocol
                    && m.sw_if_index == ctx.sw_if_index
                    && m.vrf_id == ctx.vrf_id
            })
            .ok_or_else(|| DataplaneError::retval("del_nat44_identity_mapping", VppRetval::NoSuchEntry))?;
        state.identity_mappings.remove(position);
        Ok(())
    }

    fn nat44_global_config_dump(&self) -> DataplaneResult<Nat44GlobalDetails> {
        let mut state = self.lock();
        state.record("nat44_global_config_dump", String::new())?;
        Ok(Nat44GlobalDetails {
            forwarding: state.nat_forwarding,
            interfaces: state.nat_interfaces.clone(),
            address_pools: state.nat_pools.clone(),
            virtual_reassembly_ipv4: state.reassembly_ipv4,
            virtual_reassembly_ipv6: state.reassembly_ipv6,
        })
    }

    fn nat44_dnat_dump(&self) -> DataplaneResult<Nat44DNatDetails> {
        let mut state = self.lock();
        state.record("nat44_dnat_dump", String::new())?;
        Ok(Nat44DNatDetails {
            static_mappings: state.static_mappings.clone(),
            lb_static_mappings: state.lb_static_mappings.clone(),
            identity_mappings: state.identity_mappings.clone(),
        })
    }
}

fn enable_feature(
    dataplane: &InMemoryDataplane,
    call: &'static str,
    sw_if_index: SwIfIndex,
    is_inside: bool,
    output_feature: bool,
) -> DataplaneResult<()> {
    let mut state = dataplane.lock();
    state.record(call, format!("idx={} inside={}", sw_if_index, is_inside))?;
    if !state.interfaces.contains_key(&sw_if_index) {
        return Err(DataplaneError::retval(call, VppRetval::InvalidSwIfIndex));
    }
    let entry = NatInterfaceDetails {
        sw_if_index,
        is_inside,
        output_feature,
    };
    if state.nat_interfaces.contains(&entry) {
        return Err(DataplaneError::retval(call, VppRetval::InvalidValue));
    }
    state.nat_interfaces.push(entry);
    Ok(())
}

fn disable_feature(
    dataplane: &InMemoryDataplane,
    call: &'static str,
    sw_if_index: SwIfIndex,
    is_inside: bool,
    output_feature: bool,
) -> DataplaneResult<()> {
    let mut state = dataplane.lock();
    state.record(call, format!("idx={} inside={}", sw_if_index, is_inside))?;
    let entry = NatInterfaceDetails {
        sw_if_index,
        is_inside,
        output_feature,
    };
    let position = state
        .nat_interfaces
        .iter()
        .position(|e| *e == entry)
        .ok_or_else(|| DataplaneError::retval(call, VppRetval::NoSuchEntry))?;
    state.nat_interfaces.remove(position);
    Ok(())
}

impl StnApi for InMemoryDataplane {
    fn add_stn_rule(&self, sw_if_index: SwIfIndex, address: &IpAddress) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("add_stn_rule", format!("idx={} {}", sw_if_index, address))?;
        if !state.interfaces.contains_key(&sw_if_index) {
            return Err(DataplaneError::retval("add_stn_rule", VppRetval::InvalidSwIfIndex));
        }
        let rule = StnRuleDetails {
            sw_if_index,
            ip_address: *address,
        };
        if state.stn_rules.contains(&rule) {
            return Err(DataplaneError::retval("add_stn_rule", VppRetval::InvalidValue));
        }
        state.stn_rules.push(rule);
        Ok(())
    }

    fn del_stn_rule(&self, sw_if_index: SwIfIndex, address: &IpAddress) -> DataplaneResult<()> {
        let mut state = self.lock();
        state.record("del_stn_rule", format!("idx={} {}", sw_if_index, address))?;
        let rule = StnRuleDetails {
            sw_if_index,
            ip_address: *address,
        };
        let position = state
            .stn_rules
            .iter()
            .position(|r| *r == rule)
            .ok_or_else(|| DataplaneError::retval("del_stn_rule", VppRetval::NoSuchEntry))?;
        state.stn_rules.remove(position);
        Ok(())
    }

    fn dump_stn_rules(&self) -> DataplaneResult<Vec<StnRuleDetails>> {
        let mut state = self.lock();
        state.record("dump_stn_rules", String::new())?;
        Ok(state.stn_rules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemifMode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_starts_with_local0_only() {
        let dataplane = InMemoryDataplane::new();
        let dump = dataplane.dump_interfaces().unwrap();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[&0].meta.internal_name, "local0");
        assert_eq!(dump[&0].interface.name, "local0");
    }

    #[test]
    fn test_tap_round_trips_through_dump() {
        let dataplane = InMemoryDataplane::new();
        let tap = TapLink {
            version: 2,
            host_if_name: "tap-host".to_string(),
            ..Default::default()
        };
        let idx = dataplane.add_tap_interface("tap1", &tap).unwrap();
        dataplane.interface_admin_up(idx).unwrap();
        dataplane
            .add_interface_ip(idx, &"10.0.0.1/24".parse().unwrap())
            .unwrap();

        let details = dataplane.interface_details(idx).unwrap();
        assert_eq!(details.interface.name, "tap1");
        assert_eq!(details.meta.internal_name, "tap0");
        assert!(details.interface.enabled);
        assert_eq!(details.interface.ip_addresses, vec!["10.0.0.1/24".to_string()]);
        assert_eq!(details.interface.link, InterfaceLink::Tap(tap));
    }

    #[test]
    fn test_ipv6_address_brings_link_local() {
        let dataplane = InMemoryDataplane::new();
        let idx = dataplane.add_loopback_interface("loop1").unwrap();
        dataplane
            .add_interface_ip(idx, &"2001:db8::1/64".parse().unwrap())
            .unwrap();

        let ips = dataplane.interface_details(idx).unwrap().interface.ip_addresses;
        assert_eq!(ips.len(), 2);
        assert!(ips[0].starts_with("fe80"));
    }

    #[test]
    fn test_memif_dump_uses_socket_filename() {
        let dataplane = InMemoryDataplane::new();
        dataplane
            .register_memif_socket_filename("/tmp/memif1.sock", 1)
            .unwrap();
        let memif = MemifLink {
            id: 3,
            mode: MemifMode::Ip,
            secret: Some("s3cr3t".to_string()),
            socket_filename: "/tmp/memif1.sock".to_string(),
            ..Default::default()
        };
        let idx = dataplane.add_memif_interface("memif1", &memif, 1).unwrap();

        let details = dataplane.interface_details(idx).unwrap();
        assert_eq!(details.meta.internal_name, "memif1/3");
        match details.interface.link {
            InterfaceLink::Memif(dumped) => {
                assert_eq!(dumped.socket_filename, "/tmp/memif1.sock");
                assert_eq!(dumped.secret, None);
            }
            other => panic!("unexpected link {:?}", other),
        }

        let sockets = dataplane.dump_memif_socket_details().unwrap();
        assert_eq!(sockets.get(DEFAULT_MEMIF_SOCKET), Some(&0));
        assert_eq!(sockets.get("/tmp/memif1.sock"), Some(&1));
    }

    #[test]
    fn test_fail_call_records_and_fails() {
        let dataplane = InMemoryDataplane::new();
        dataplane.fail_call("add_loopback_interface");

        let err = dataplane.add_loopback_interface("loop1").unwrap_err();
        assert_eq!(err.retval_code(), Some(VppRetval::Unspecified));
        assert_eq!(dataplane.call_names(), vec!["add_loopback_interface"]);
        assert_eq!(dataplane.interface_count(), 1);

        dataplane.clear_failures();
        assert!(dataplane.add_loopback_interface("loop1").is_ok());
    }

    #[test]
    fn test_dumps_are_not_mutating() {
        let dataplane = InMemoryDataplane::new();
        dataplane.dump_interfaces().unwrap();
        dataplane.get_bfd_echo_source().unwrap();
        dataplane.nat44_global_config_dump().unwrap();
        assert!(dataplane.mutating_calls().is_empty());

        dataplane.set_nat44_forwarding(true).unwrap();
        assert_eq!(dataplane.mutating_calls().len(), 1);
    }

    #[test]
    fn test_unknown_index_is_rejected() {
        let dataplane = InMemoryDataplane::new();
        let err = dataplane.interface_admin_up(42).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_emits_notification() {
        let dataplane = InMemoryDataplane::new();
        let idx = dataplane.add_loopback_interface("loop1").unwrap();
        dataplane.interface_admin_up(idx).unwrap();
        dataplane.delete_loopback_interface("loop1", idx).unwrap();

        let notifications = dataplane.take_notifications();
        assert_eq!(notifications.len(), 2);
        assert!(matches!(
            notifications[1],
            DataplaneNotification::InterfaceEvent(InterfaceEvent { deleted: true, .. })
        ));
        assert!(dataplane.take_notifications().is_empty());
    }

    #[test]
    fn test_bfd_key_in_use_cannot_be_deleted() {
        let dataplane = InMemoryDataplane::new();
        let idx = dataplane.add_loopback_interface("loop1").unwrap();
        let key = BfdAuthKey {
            name: "key1".to_string(),
            id: 1,
            authentication_type: Default::default(),
            secret: "secret".to_string(),
        };
        dataplane.set_bfd_udp_auth_key(&key).unwrap();
        dataplane
            .add_bfd_udp_session(&BfdUdpSession {
                sw_if_index: idx,
                source_address: "10.0.0.1".parse().unwrap(),
                destination_address: "10.0.0.2".parse().unwrap(),
                desired_min_tx_interval: 10,
                required_min_rx_interval: 10,
                detect_multiplier: 3,
                authentication: Some(crate::model::BfdAuthentication {
                    key_id: 1,
                    advertised_key_id: 1,
                }),
            })
            .unwrap();

        assert!(dataplane.delete_bfd_udp_auth_key(&key).is_err());
        let dumped = dataplane.dump_bfd_auth_keys().unwrap();
        assert_eq!(dumped[0].secret, "");
    }
}
