//! Interface configurator.
//!
//! Creates, modifies and deletes dataplane interfaces of every kind and keeps
//! the shared [`InterfaceRegistry`] in step with what exists. Three
//! dependencies are tracked here:
//!
//! - AF-Packet interfaces waiting for their Linux host interface (through the
//!   owned [`AfPacketConfigurator`]).
//! - Unnumbered interfaces waiting for their address donor. The interface
//!   itself is created, only the unnumbered binding waits.
//! - VXLAN tunnels waiting for their multicast interface. The tunnel is not
//!   created until the multicast interface exists.

use super::{InterfaceRegistry, InterfaceStateUpdater, TEMP_INTERFACE_NAME};
use crate::afpacket::{AfPacketConfigurator, AfPacketResolution, LinuxSupport};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::diff::{self, effective_mtu, ip_diff, managed_addresses};
use crate::resync::ResyncOutcome;
use crate::{audit_log, debug_log, info_log, warn_log};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use vpp_agent_common::{
    ConfigError, ConfigResult, ConfigureOutcome, DataplaneContext, Operation, ParseContext,
    PendingCache,
};
use vpp_dataplane::model::{
    Interface, InterfaceKind, InterfaceLink, RxMode, RxModeSettings, VxlanLink,
};
use vpp_dataplane::{Dataplane, InterfaceApi, SwIfIndex, NO_INTERFACE};
use vpp_types::{strip_mask, IpAddress, IpPrefix};

const SOURCE: &str = "InterfaceConfigurator";

#[derive(Debug, Clone, Default)]
pub struct InterfaceConfiguratorConfig {
    /// MTU for interfaces whose config leaves it at 0. 0 means none.
    pub default_mtu: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceConfiguratorStats {
    pub created: u64,
    pub modified: u64,
    pub recreated: u64,
    pub deleted: u64,
    pub deferred: u64,
    pub skipped: u64,
}

/// Parsed addresses of a validated config.
struct Addressing {
    ips: Vec<IpPrefix>,
    container_ip: Option<IpPrefix>,
}

fn validate(operation: Operation, interface: &Interface) -> ConfigResult<Addressing> {
    let name = interface.name.as_str();
    if name.is_empty() {
        return Err(ConfigError::validation(operation, name, "interface name is empty"));
    }
    let ips = diff::parse_ip_addresses(&interface.ip_addresses).parse_context(operation, name)?;
    let container_ip = match interface.container_ip_address.as_deref() {
        Some(ip) if !ip.is_empty() => Some(ip.parse::<IpPrefix>().parse_context(operation, name)?),
        _ => None,
    };

    match &interface.link {
        InterfaceLink::Memif(memif) if memif.socket_filename.is_empty() => {
            return Err(ConfigError::validation(operation, name, "memif socket filename is empty"));
        }
        InterfaceLink::Vxlan(vxlan) => {
            vxlan.src_address.parse::<IpAddress>().parse_context(operation, name)?;
            if vxlan.multicast.as_deref().filter(|m| !m.is_empty()).is_none() {
                vxlan.dst_address.parse::<IpAddress>().parse_context(operation, name)?;
            }
        }
        InterfaceLink::AfPacket(afpacket) if afpacket.host_if_name.is_empty() => {
            return Err(ConfigError::validation(operation, name, "af_packet host interface name is empty"));
        }
        InterfaceLink::Ethernet => {
            if let Some(rx) = interface.rx_mode {
                if rx.rx_mode != RxMode::Polling {
                    return Err(ConfigError::validation(
                        operation,
                        name,
                        format!("physical interface supports only polling rx-mode, got {:?}", rx.rx_mode),
                    ));
                }
            }
        }
        _ => {}
    }

    Ok(Addressing { ips, container_ip })
}

/// First multicast address configured on `interface`.
fn first_multicast_address(interface: &Interface) -> Option<IpAddress> {
    interface
        .ip_addresses
        .iter()
        .filter_map(|ip| strip_mask(ip).parse::<IpAddress>().ok())
        .find(IpAddress::is_multicast)
}

fn multicast_of(vxlan: &VxlanLink) -> Option<&str> {
    vxlan.multicast.as_deref().filter(|m| !m.is_empty())
}

fn keep_first(first: &mut Option<ConfigError>, result: ConfigResult<()>) {
    if let Err(err) = result {
        warn_log!(SOURCE, error = %err, "dependent resolution failed");
        first.get_or_insert(err);
    }
}

pub struct InterfaceConfigurator {
    config: InterfaceConfiguratorConfig,
    dataplane: Arc<dyn Dataplane>,
    registry: Arc<InterfaceRegistry>,
    state: Option<Arc<InterfaceStateUpdater>>,
    afpacket: AfPacketConfigurator,
    /// Memif socket filename to socket id.
    memif_sockets: HashMap<String, u32>,
    unnumbered: PendingCache<Interface>,
    vxlan_multicast: PendingCache<Interface>,
    stats: InterfaceConfiguratorStats,
}

impl std::fmt::Debug for InterfaceConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceConfigurator")
            .field("config", &self.config)
            .field("registered", &self.registry.len())
            .field("afpacket", &self.afpacket)
            .field("memif_sockets", &self.memif_sockets)
            .field("unnumbered_pending", &self.unnumbered.len())
            .field("vxlan_pending", &self.vxlan_multicast.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl InterfaceConfigurator {
    pub fn new(
        config: InterfaceConfiguratorConfig,
        dataplane: Arc<dyn Dataplane>,
        registry: Arc<InterfaceRegistry>,
        linux: Option<LinuxSupport>,
    ) -> Self {
        InterfaceConfigurator {
            config,
            afpacket: AfPacketConfigurator::new(dataplane.clone(), linux),
            dataplane,
            registry,
            state: None,
            memif_sockets: HashMap::new(),
            unnumbered: PendingCache::new(),
            vxlan_multicast: PendingCache::new(),
            stats: InterfaceConfiguratorStats::default(),
        }
    }

    /// Publishes interface details to `state` after every change.
    pub fn set_state_updater(&mut self, state: Arc<InterfaceStateUpdater>) {
        self.state = Some(state);
    }

    pub fn config(&self) -> &InterfaceConfiguratorConfig {
        &self.config
    }

    pub fn stats(&self) -> &InterfaceConfiguratorStats {
        &self.stats
    }

    pub fn registry(&self) -> &Arc<InterfaceRegistry> {
        &self.registry
    }

    pub fn afpacket(&self) -> &AfPacketConfigurator {
        &self.afpacket
    }

    pub fn is_vxlan_pending(&self, name: &str) -> bool {
        self.vxlan_multicast.is_pending(name)
    }

    /// True when `name` is a configured VXLAN using a multicast interface.
    pub fn is_vxlan_bound(&self, name: &str) -> bool {
        self.vxlan_multicast.is_bound(name)
    }

    pub fn is_unnumbered_pending(&self, name: &str) -> bool {
        self.unnumbered.is_pending(name)
    }

    pub fn memif_socket_id(&self, filename: &str) -> Option<u32> {
        self.memif_sockets.get(filename).copied()
    }

    /// Reloads the memif socket filename cache from the dataplane.
    pub fn refresh_memif_sockets(&mut self) -> ConfigResult<()> {
        self.memif_sockets = self
            .dataplane
            .dump_memif_socket_details()
            .context(Operation::Resync, "memif-sockets", "dump_memif_socket_details")?;
        Ok(())
    }

    fn ensure_memif_socket(&mut self, operation: Operation, name: &str, filename: &str) -> ConfigResult<u32> {
        if let Some(id) = self.memif_sockets.get(filename) {
            return Ok(*id);
        }
        let id = (0u32..)
            .find(|candidate| !self.memif_sockets.values().any(|used| used == candidate))
            .unwrap_or_default();
        self.dataplane
            .register_memif_socket_filename(filename, id)
            .context(operation, name, "register_memif_socket_filename")?;
        debug_log!(SOURCE, filename, socket_id = id, "memif socket registered");
        self.memif_sockets.insert(filename.to_string(), id);
        Ok(id)
    }

    fn publish_state(&self, sw_if_index: SwIfIndex) {
        let Some(state) = &self.state else {
            return;
        };
        match self.dataplane.dump_interfaces() {
            Ok(dump) => {
                if let Some(details) = dump.get(&sw_if_index) {
                    state.update_details(details);
                }
            }
            Err(err) => warn_log!(SOURCE, error = %err, "cannot read interface details"),
        }
    }

    fn publish_all_states(&self) {
        let Some(state) = &self.state else {
            return;
        };
        match self.dataplane.dump_interfaces() {
            Ok(dump) => dump.values().for_each(|details| state.update_details(details)),
            Err(err) => warn_log!(SOURCE, error = %err, "cannot read interface details"),
        }
    }

    /// Creates `interface` and applies all of its properties.
    ///
    /// Returns `Pending` when a VXLAN multicast interface or an AF-Packet host
    /// interface does not exist yet, and `Skipped` for a physical interface
    /// the dataplane does not have.
    pub fn configure(&mut self, interface: &Interface) -> ConfigResult<ConfigureOutcome> {
        let op = Operation::Configure;
        let addressing = validate(op, interface)?;
        let name = interface.name.as_str();

        let sw_if_index = match &interface.link {
            InterfaceLink::Tap(tap) => self
                .dataplane
                .add_tap_interface(name, tap)
                .context(op, name, "add_tap_interface")?,
            InterfaceLink::Memif(memif) => {
                let socket_id = self.ensure_memif_socket(op, name, &memif.socket_filename)?;
                self.dataplane
                    .add_memif_interface(name, memif, socket_id)
                    .context(op, name, "add_memif_interface")?
            }
            InterfaceLink::Vxlan(vxlan) => match self.create_vxlan(op, interface, vxlan)? {
                Some(sw_if_index) => sw_if_index,
                None => {
                    self.stats.deferred += 1;
                    return Ok(ConfigureOutcome::Pending {
                        dependency: multicast_of(vxlan).unwrap_or_default().to_string(),
                    });
                }
            },
            InterfaceLink::AfPacket(link) => match self.afpacket.configure(interface, link)? {
                Some(sw_if_index) => sw_if_index,
                None => {
                    self.stats.deferred += 1;
                    return Ok(ConfigureOutcome::Pending {
                        dependency: link.host_if_name.clone(),
                    });
                }
            },
            InterfaceLink::Loopback => self
                .dataplane
                .add_loopback_interface(name)
                .context(op, name, "add_loopback_interface")?,
            InterfaceLink::Ethernet => match self.registry.handle_of(name) {
                Some(sw_if_index) => sw_if_index,
                None => {
                    warn_log!(SOURCE, interface = name, "physical interface not found, skipping");
                    self.stats.skipped += 1;
                    return Ok(ConfigureOutcome::Skipped);
                }
            },
        };

        let applied = self
            .apply_properties(op, interface, &addressing, sw_if_index)
            .and_then(|()| self.apply_admin_state(op, interface, sw_if_index));
        if let Err(err) = applied {
            self.discard_created(interface, sw_if_index);
            return Err(err);
        }

        self.registry.register(name, sw_if_index, interface.clone());
        self.bind_link(interface);
        self.stats.created += 1;
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "configure_interface")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(name)
            .with_object_type(interface.kind().to_string())
            .with_details(serde_json::json!({
                "sw_if_index": sw_if_index,
                "enabled": interface.enabled,
                "ip_addresses": interface.ip_addresses,
            })));
        self.publish_state(sw_if_index);

        let mut first_error = None;
        keep_first(&mut first_error, self.resolve_unnumbered_created(name, sw_if_index));
        keep_first(&mut first_error, self.resolve_vxlans_created(name));
        match first_error {
            Some(err) => Err(err),
            None => Ok(ConfigureOutcome::Configured { handle: sw_if_index }),
        }
    }

    fn apply_properties(
        &mut self,
        op: Operation,
        interface: &Interface,
        addressing: &Addressing,
        sw_if_index: SwIfIndex,
    ) -> ConfigResult<()> {
        let name = interface.name.as_str();
        let kind = interface.kind();

        if let Some(rx_mode) = interface.rx_mode {
            self.dataplane
                .set_rx_mode(sw_if_index, &rx_mode)
                .context(op, name, "set_rx_mode")?;
        }
        // AF-Packet takes its MAC at creation.
        if let Some(mac) = interface.phys_address {
            if kind != InterfaceKind::AfPacket {
                self.dataplane
                    .set_interface_mac(sw_if_index, &mac)
                    .context(op, name, "set_interface_mac")?;
            }
        }
        if interface.set_dhcp_client {
            self.dataplane
                .set_interface_as_dhcp_client(sw_if_index, name)
                .context(op, name, "set_interface_as_dhcp_client")?;
        }
        if kind != InterfaceKind::Vxlan && interface.vrf != 0 {
            self.set_vrf(op, name, sw_if_index, interface.vrf, &addressing.ips)?;
        }
        self.apply_addressing(op, interface, &addressing.ips, sw_if_index)?;
        if let Some(container_ip) = &addressing.container_ip {
            self.dataplane
                .add_container_ip(sw_if_index, container_ip)
                .context(op, name, "add_container_ip")?;
        }
        if let Some(mtu) = effective_mtu(interface, self.config.default_mtu) {
            self.dataplane
                .set_interface_mtu(sw_if_index, mtu)
                .context(op, name, "set_interface_mtu")?;
        }
        Ok(())
    }

    fn apply_admin_state(&self, op: Operation, interface: &Interface, sw_if_index: SwIfIndex) -> ConfigResult<()> {
        let name = interface.name.as_str();
        if interface.enabled {
            self.dataplane
                .interface_admin_up(sw_if_index)
                .context(op, name, "interface_admin_up")?;
        } else if interface.kind() == InterfaceKind::Ethernet {
            self.dataplane
                .interface_admin_down(sw_if_index)
                .context(op, name, "interface_admin_down")?;
        }
        Ok(())
    }

    /// Removes an interface whose configure failed after the dataplane
    /// object was created. Physical interfaces are left alone.
    fn discard_created(&mut self, interface: &Interface, sw_if_index: SwIfIndex) {
        let name = interface.name.as_str();
        self.unnumbered.remove(name);
        let removed = match &interface.link {
            InterfaceLink::Tap(tap) => self.dataplane.delete_tap_interface(name, sw_if_index, tap.version),
            InterfaceLink::Memif(_) => self.dataplane.delete_memif_interface(name, sw_if_index),
            InterfaceLink::Vxlan(vxlan) => {
                self.dataplane
                    .delete_vxlan_tunnel(name, sw_if_index, interface.vrf, vxlan)
            }
            InterfaceLink::AfPacket(link) => self.dataplane.delete_af_packet_interface(name, sw_if_index, link),
            InterfaceLink::Loopback => self.dataplane.delete_loopback_interface(name, sw_if_index),
            InterfaceLink::Ethernet => return,
        };
        match removed {
            Ok(()) => debug_log!(SOURCE, interface = name, sw_if_index, "half-configured interface removed"),
            Err(err) => warn_log!(SOURCE, interface = name, error = %err, "cannot remove half-configured interface"),
        }
    }

    /// Binds a registered AF-Packet to its host and a VXLAN to its
    /// multicast interface.
    fn bind_link(&mut self, interface: &Interface) {
        match &interface.link {
            InterfaceLink::AfPacket(_) => self.afpacket.adopt(interface),
            InterfaceLink::Vxlan(vxlan) => {
                if let Some(multicast) = multicast_of(vxlan) {
                    self.vxlan_multicast
                        .bind(interface.name.as_str(), multicast, interface.clone());
                }
            }
            _ => {}
        }
    }

    /// Sets the VRF per address family: IPv4 when the interface has IPv4
    /// addresses or none at all, IPv6 when it has IPv6 addresses.
    fn set_vrf(
        &self,
        op: Operation,
        name: &str,
        sw_if_index: SwIfIndex,
        vrf: u32,
        ips: &[IpPrefix],
    ) -> ConfigResult<()> {
        let has_ipv4 = ips.iter().any(IpPrefix::is_ipv4);
        let has_ipv6 = ips.iter().any(IpPrefix::is_ipv6);
        if has_ipv4 || !has_ipv6 {
            if vrf != 0 {
                self.dataplane.create_vrf(vrf).context(op, name, "create_vrf")?;
            }
            self.dataplane
                .set_interface_vrf(sw_if_index, vrf)
                .context(op, name, "set_interface_vrf")?;
        }
        if has_ipv6 {
            if vrf != 0 {
                self.dataplane
                    .create_vrf_ipv6(vrf)
                    .context(op, name, "create_vrf_ipv6")?;
            }
            self.dataplane
                .set_interface_vrf_ipv6(sw_if_index, vrf)
                .context(op, name, "set_interface_vrf_ipv6")?;
        }
        Ok(())
    }

    /// Binds the interface to its unnumbered donor, or adds its addresses.
    fn apply_addressing(
        &mut self,
        op: Operation,
        interface: &Interface,
        ips: &[IpPrefix],
        sw_if_index: SwIfIndex,
    ) -> ConfigResult<()> {
        let name = interface.name.as_str();
        match interface.unnumbered_donor() {
            Some(donor) => match self.registry.handle_of(donor) {
                Some(donor_index) => {
                    self.dataplane
                        .set_unnumbered_ip(sw_if_index, donor_index)
                        .context(op, name, "set_unnumbered_ip")?;
                    self.unnumbered.bind(name, donor, interface.clone());
                }
                None => {
                    self.unnumbered.defer(name, donor, interface.clone());
                    self.stats.deferred += 1;
                    audit_log!(AuditRecord::new(AuditCategory::PendingTransition, SOURCE, "defer_unnumbered")
                        .with_outcome(AuditOutcome::Deferred)
                        .with_object_id(name)
                        .with_details(serde_json::json!({ "interface_with_ip": donor })));
                }
            },
            None => {
                for ip in managed_addresses(ips) {
                    self.dataplane
                        .add_interface_ip(sw_if_index, &ip)
                        .context(op, name, "add_interface_ip")?;
                }
            }
        }
        Ok(())
    }

    /// Reverses [`apply_addressing`](Self::apply_addressing) for the
    /// previously applied `interface`.
    fn remove_addressing(
        &mut self,
        op: Operation,
        interface: &Interface,
        sw_if_index: SwIfIndex,
    ) -> ConfigResult<()> {
        let name = interface.name.as_str();
        if interface.unnumbered_donor().is_some() {
            if !self.unnumbered.is_pending(name) {
                self.dataplane
                    .unset_unnumbered_ip(sw_if_index)
                    .context(op, name, "unset_unnumbered_ip")?;
            }
            self.unnumbered.remove(name);
            return Ok(());
        }
        let ips: Vec<IpPrefix> = interface
            .ip_addresses
            .iter()
            .filter_map(|ip| ip.parse().ok())
            .collect();
        for ip in managed_addresses(&ips) {
            self.dataplane
                .del_interface_ip(sw_if_index, &ip)
                .context(op, name, "del_interface_ip")?;
        }
        Ok(())
    }

    fn create_vxlan(
        &mut self,
        op: Operation,
        interface: &Interface,
        vxlan: &VxlanLink,
    ) -> ConfigResult<Option<SwIfIndex>> {
        let name = interface.name.as_str();
        let multicast = multicast_of(vxlan);

        let (multicast_if, link) = match multicast {
            None => (NO_INTERFACE, vxlan.clone()),
            Some(multicast) => match self.registry.lookup_by_name(multicast) {
                None => {
                    self.vxlan_multicast.defer(name, multicast, interface.clone());
                    audit_log!(AuditRecord::new(AuditCategory::PendingTransition, SOURCE, "defer_vxlan")
                        .with_outcome(AuditOutcome::Deferred)
                        .with_object_id(name)
                        .with_object_type("vxlan")
                        .with_details(serde_json::json!({ "multicast": multicast })));
                    return Ok(None);
                }
                Some((multicast_index, multicast_config)) => {
                    let group = first_multicast_address(&multicast_config).ok_or_else(|| {
                        ConfigError::validation(
                            op,
                            name,
                            format!("multicast interface {} has no multicast IP address", multicast),
                        )
                    })?;
                    let mut link = vxlan.clone();
                    link.dst_address = group.to_string();
                    (multicast_index, link)
                }
            },
        };

        if interface.vrf != 0 {
            self.dataplane
                .create_vrf(interface.vrf)
                .context(op, name, "create_vrf")?;
        }
        let sw_if_index = self
            .dataplane
            .add_vxlan_tunnel(name, interface.vrf, multicast_if, &link)
            .context(op, name, "add_vxlan_tunnel")?;
        Ok(Some(sw_if_index))
    }

    /// Binds every interface waiting for `donor` as its unnumbered donor.
    fn resolve_unnumbered_created(&mut self, donor: &str, donor_index: SwIfIndex) -> ConfigResult<()> {
        let op = Operation::ResolveCreated;
        let mut first_error = None;
        for (name, interface) in self.unnumbered.resolve_created(donor) {
            let Some(sw_if_index) = self.registry.handle_of(&name) else {
                debug_log!(SOURCE, interface = %name, "unnumbered interface not registered");
                continue;
            };
            let result = self
                .dataplane
                .set_unnumbered_ip(sw_if_index, donor_index)
                .context(op, &name, "set_unnumbered_ip");
            if result.is_ok() {
                info_log!(SOURCE, interface = %name, donor, "unnumbered interface bound");
                self.unnumbered.bind(name, donor, interface);
            }
            keep_first(&mut first_error, result);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Unbinds every interface using `donor` and parks it again.
    fn resolve_unnumbered_deleted(&mut self, donor: &str) -> ConfigResult<()> {
        let op = Operation::ResolveDeleted;
        for (name, interface) in self.unnumbered.resolve_deleted(donor) {
            if let Some(sw_if_index) = self.registry.handle_of(&name) {
                self.dataplane
                    .unset_unnumbered_ip(sw_if_index)
                    .context(op, &name, "unset_unnumbered_ip")?;
            }
            info_log!(SOURCE, interface = %name, donor, "unnumbered interface back to pending");
            self.unnumbered.defer(name, donor, interface);
        }
        Ok(())
    }

    /// Configures every VXLAN waiting for `multicast`. A VXLAN that fails
    /// does not go back to the cache.
    fn resolve_vxlans_created(&mut self, multicast: &str) -> ConfigResult<()> {
        let mut first_error = None;
        for (name, vxlan) in self.vxlan_multicast.resolve_created(multicast) {
            debug_log!(SOURCE, interface = %name, multicast, "configuring cached vxlan");
            keep_first(&mut first_error, self.configure(&vxlan).map(|_| ()));
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Deletes every VXLAN using `multicast` and parks it again.
    fn resolve_vxlans_deleted(&mut self, multicast: &str) -> ConfigResult<()> {
        for (name, vxlan) in self.vxlan_multicast.resolve_deleted(multicast) {
            self.delete(&vxlan)?;
            info_log!(SOURCE, interface = %name, multicast, "vxlan back to pending");
            self.vxlan_multicast.defer(name, multicast, vxlan);
        }
        Ok(())
    }

    /// Applies the difference between `old` and `new`.
    ///
    /// A change of a field the dataplane cannot update in place (see
    /// [`diff::link_requires_recreate`]) deletes the interface and configures
    /// it again. Everything else is applied field by field.
    pub fn modify(&mut self, old: &Interface, new: &Interface) -> ConfigResult<()> {
        let op = Operation::Modify;
        let addressing = validate(op, new)?;
        let name = new.name.as_str();

        let recreate = old.name != new.name
            || diff::link_requires_recreate(&old.link, &new.link)
            || (new.kind() == InterfaceKind::Vxlan && old.vrf != new.vrf)
            || self.vxlan_multicast.is_pending(&old.name)
            || (new.kind() == InterfaceKind::AfPacket && self.afpacket.requires_recreate(old, new));
        if recreate {
            debug_log!(SOURCE, interface = name, "recreating interface");
            self.delete(old)?;
            self.stats.recreated += 1;
            return self.configure(new).map(|_| ());
        }

        let Some(sw_if_index) = self.registry.handle_of(name) else {
            return self.configure(new).map(|_| ());
        };
        let kind = new.kind();

        if new.rx_mode != old.rx_mode {
            let rx_mode = new
                .rx_mode
                .unwrap_or_else(|| RxModeSettings::all_queues(kind.default_rx_mode()));
            self.dataplane
                .set_rx_mode(sw_if_index, &rx_mode)
                .context(op, name, "set_rx_mode")?;
        }
        if let Some(mac) = new.phys_address {
            if old.phys_address != Some(mac) && kind != InterfaceKind::AfPacket {
                self.dataplane
                    .set_interface_mac(sw_if_index, &mac)
                    .context(op, name, "set_interface_mac")?;
            }
        }
        if new.enabled != old.enabled {
            if new.enabled {
                self.dataplane
                    .interface_admin_up(sw_if_index)
                    .context(op, name, "interface_admin_up")?;
            } else {
                self.dataplane
                    .interface_admin_down(sw_if_index)
                    .context(op, name, "interface_admin_down")?;
            }
        }
        if new.set_dhcp_client != old.set_dhcp_client {
            if new.set_dhcp_client {
                self.dataplane
                    .set_interface_as_dhcp_client(sw_if_index, name)
                    .context(op, name, "set_interface_as_dhcp_client")?;
            } else {
                self.dataplane
                    .unset_interface_as_dhcp_client(sw_if_index, name)
                    .context(op, name, "unset_interface_as_dhcp_client")?;
            }
        }

        // Addresses are re-added as a whole when they move to another VRF or
        // when the interface switches between numbered and unnumbered.
        let vrf_changed = kind != InterfaceKind::Vxlan && new.vrf != old.vrf;
        let unnumbered_changed = old.unnumbered_donor() != new.unnumbered_donor();
        if vrf_changed || unnumbered_changed {
            self.remove_addressing(op, old, sw_if_index)?;
            if vrf_changed {
                self.set_vrf(op, name, sw_if_index, new.vrf, &addressing.ips)?;
            }
            self.apply_addressing(op, new, &addressing.ips, sw_if_index)?;
        } else if new.unnumbered_donor().is_none() {
            let old_ips: Vec<IpPrefix> = old
                .ip_addresses
                .iter()
                .filter_map(|ip| ip.parse().ok())
                .collect();
            let (to_delete, to_add) = ip_diff(&old_ips, &addressing.ips);
            for ip in &to_delete {
                self.dataplane
                    .del_interface_ip(sw_if_index, ip)
                    .context(op, name, "del_interface_ip")?;
            }
            for ip in &to_add {
                self.dataplane
                    .add_interface_ip(sw_if_index, ip)
                    .context(op, name, "add_interface_ip")?;
            }
        }

        let old_container_ip = old
            .container_ip_address
            .as_deref()
            .and_then(|ip| ip.parse::<IpPrefix>().ok());
        if old_container_ip != addressing.container_ip {
            if let Some(ip) = &old_container_ip {
                self.dataplane
                    .del_container_ip(sw_if_index, ip)
                    .context(op, name, "del_container_ip")?;
            }
            if let Some(ip) = &addressing.container_ip {
                self.dataplane
                    .add_container_ip(sw_if_index, ip)
                    .context(op, name, "add_container_ip")?;
            }
        }

        let mtu = effective_mtu(new, self.config.default_mtu);
        if let Some(value) = mtu {
            if mtu != effective_mtu(old, self.config.default_mtu) {
                self.dataplane
                    .set_interface_mtu(sw_if_index, value)
                    .context(op, name, "set_interface_mtu")?;
            }
        }

        if kind == InterfaceKind::AfPacket {
            self.afpacket.adopt(new);
        }
        self.registry.update_metadata(name, new.clone());
        self.stats.modified += 1;
        audit_log!(AuditRecord::new(AuditCategory::ResourceModify, SOURCE, "modify_interface")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(name)
            .with_object_type(kind.to_string()));
        self.publish_state(sw_if_index);
        Ok(())
    }

    /// Removes `interface` from the dataplane and the registry.
    ///
    /// A pending interface is only dropped from its cache. A physical
    /// interface is only unconfigured and stays registered.
    pub fn delete(&mut self, interface: &Interface) -> ConfigResult<()> {
        let op = Operation::Delete;
        let name = interface.name.as_str();

        if self.vxlan_multicast.is_pending(name) {
            self.vxlan_multicast.remove(name);
            debug_log!(SOURCE, interface = name, "pending vxlan dropped");
            return Ok(());
        }
        if let InterfaceLink::AfPacket(link) = &interface.link {
            if self.afpacket.is_pending(name) {
                return self.afpacket.delete(name, None, link);
            }
        }
        let Some(sw_if_index) = self.registry.handle_of(name) else {
            warn_log!(SOURCE, interface = name, "interface not registered, nothing to delete");
            self.unnumbered.remove(name);
            return Ok(());
        };

        self.resolve_unnumbered_deleted(name)?;
        self.resolve_vxlans_deleted(name)?;

        if interface.enabled {
            self.dataplane
                .interface_admin_down(sw_if_index)
                .context(op, name, "interface_admin_down")?;
        }
        if interface.set_dhcp_client {
            self.dataplane
                .unset_interface_as_dhcp_client(sw_if_index, name)
                .context(op, name, "unset_interface_as_dhcp_client")?;
        }
        if let Some(ip) = interface
            .container_ip_address
            .as_deref()
            .and_then(|ip| ip.parse::<IpPrefix>().ok())
        {
            self.dataplane
                .del_container_ip(sw_if_index, &ip)
                .context(op, name, "del_container_ip")?;
        }
        self.remove_addressing(op, interface, sw_if_index)?;

        match &interface.link {
            InterfaceLink::Tap(tap) => self
                .dataplane
                .delete_tap_interface(name, sw_if_index, tap.version)
                .context(op, name, "delete_tap_interface")?,
            InterfaceLink::Memif(_) => self
                .dataplane
                .delete_memif_interface(name, sw_if_index)
                .context(op, name, "delete_memif_interface")?,
            InterfaceLink::Vxlan(vxlan) => self
                .dataplane
                .delete_vxlan_tunnel(name, sw_if_index, interface.vrf, vxlan)
                .context(op, name, "delete_vxlan_tunnel")?,
            InterfaceLink::AfPacket(link) => self.afpacket.delete(name, Some(sw_if_index), link)?,
            InterfaceLink::Loopback => self
                .dataplane
                .delete_loopback_interface(name, sw_if_index)
                .context(op, name, "delete_loopback_interface")?,
            InterfaceLink::Ethernet => {
                if interface.vrf != 0 {
                    self.dataplane
                        .set_interface_vrf(sw_if_index, 0)
                        .context(op, name, "set_interface_vrf")?;
                }
                self.registry
                    .update_metadata(name, Interface::new(name, InterfaceLink::Ethernet));
                audit_log!(AuditRecord::new(AuditCategory::ResourceModify, SOURCE, "unconfigure_physical")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(name)
                    .with_object_type("ethernet"));
                self.publish_state(sw_if_index);
                return Ok(());
            }
        }

        self.vxlan_multicast.remove(name);
        self.registry.unregister(name);
        if let Some(state) = &self.state {
            state.mark_deleted(sw_if_index);
        }
        self.stats.deleted += 1;
        audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "delete_interface")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(name)
            .with_object_type(interface.kind().to_string())
            .with_details(serde_json::json!({ "sw_if_index": sw_if_index })));
        Ok(())
    }

    /// A Linux host interface appeared: configure the AF-Packets waiting for
    /// it and recreate the ones still bound to an older instance.
    pub fn resolve_created_linux_interface(&mut self, host_if_name: &str) -> ConfigResult<()> {
        let mut first_error = None;
        for resolution in self.afpacket.resolve_created(host_if_name) {
            let result = match resolution {
                AfPacketResolution::Configure(interface) => self.configure(&interface).map(|_| ()),
                AfPacketResolution::Recreate(interface) => self
                    .delete(&interface)
                    .and_then(|_| self.configure(&interface).map(|_| ())),
            };
            keep_first(&mut first_error, result);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// A Linux host interface disappeared: delete the AF-Packets on it.
    ///
    /// They are not parked again. A later configure of the same interface
    /// waits for the host.
    pub fn resolve_deleted_linux_interface(&mut self, host_if_name: &str) -> ConfigResult<()> {
        let mut first_error = None;
        for interface in self.afpacket.resolve_deleted(host_if_name) {
            keep_first(&mut first_error, self.delete(&interface));
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Records the dependencies of an interface found in a dump.
    fn adopt(&mut self, actual: &Interface) {
        let name = actual.name.as_str();
        if let Some(donor) = actual.unnumbered_donor() {
            self.unnumbered.bind(name, donor, actual.clone());
        }
        self.bind_link(actual);
    }

    fn reconcile(
        &mut self,
        sw_if_index: SwIfIndex,
        actual: &Interface,
        desired: &Interface,
        outcome: &mut ResyncOutcome,
    ) {
        self.registry.register(desired.name.clone(), sw_if_index, actual.clone());
        self.adopt(actual);
        if diff::is_interface_modified(desired, actual, self.config.default_mtu) {
            debug_log!(SOURCE, interface = %desired.name, "dumped interface differs");
            if outcome.record(self.modify(actual, desired)).is_some() {
                outcome.counts.modified += 1;
            }
        } else {
            self.registry.update_metadata(&desired.name, desired.clone());
            outcome.counts.registered += 1;
        }
    }

    fn remove_obsolete(&mut self, name: &str, sw_if_index: SwIfIndex, actual: &Interface, outcome: &mut ResyncOutcome) {
        let mut obsolete = actual.clone();
        obsolete.name = name.to_string();
        self.registry.register(name, sw_if_index, obsolete.clone());
        if outcome.record(self.delete(&obsolete)).is_some() {
            outcome.counts.deleted += 1;
        }
    }

    /// Reconciles the dataplane interfaces with `desired`.
    pub fn resync(&mut self, desired: &[Interface]) -> ResyncOutcome {
        let mut outcome = ResyncOutcome::default();
        self.registry.clear();
        self.unnumbered.clear();
        self.vxlan_multicast.clear();
        self.afpacket.clear();

        let dump = match self
            .dataplane
            .dump_interfaces()
            .context(Operation::Resync, "interfaces", "dump_interfaces")
        {
            Ok(dump) => dump,
            Err(err) => {
                outcome.errors.push(err);
                return outcome;
            }
        };
        if outcome.record(self.refresh_memif_sockets()).is_none() {
            return outcome;
        }

        let mut wanted: BTreeMap<&str, &Interface> =
            desired.iter().map(|iface| (iface.name.as_str(), iface)).collect();
        let mut untagged = Vec::new();

        for (sw_if_index, details) in &dump {
            let actual = &details.interface;
            if *sw_if_index == 0 {
                self.registry
                    .register(details.meta.internal_name.clone(), 0, actual.clone());
                continue;
            }
            if !actual.name.is_empty() {
                if let Some(desired) = wanted.remove(actual.name.as_str()) {
                    self.reconcile(*sw_if_index, actual, desired, &mut outcome);
                    continue;
                }
            }
            if details.meta.tag.is_empty() {
                untagged.push((*sw_if_index, details));
                continue;
            }
            self.remove_obsolete(&actual.name, *sw_if_index, actual, &mut outcome);
        }

        for (sw_if_index, details) in untagged {
            let candidates: Vec<&Interface> = wanted.values().copied().collect();
            match diff::correlate_interface(&details.interface, &candidates) {
                Some(desired) => {
                    wanted.remove(desired.name.as_str());
                    info_log!(SOURCE, interface = %desired.name, sw_if_index, "correlated untagged interface");
                    let tagged = self
                        .dataplane
                        .set_interface_tag(&desired.name, sw_if_index)
                        .context(Operation::Resync, &desired.name, "set_interface_tag");
                    if outcome.record(tagged).is_none() {
                        continue;
                    }
                    let mut actual = details.interface.clone();
                    actual.name = desired.name.clone();
                    self.reconcile(sw_if_index, &actual, desired, &mut outcome);
                }
                None if details.interface.kind() == InterfaceKind::Ethernet => {
                    let name = details.meta.internal_name.clone();
                    self.remove_obsolete(&name, sw_if_index, &details.interface, &mut outcome);
                }
                None => {
                    self.remove_obsolete(TEMP_INTERFACE_NAME, sw_if_index, &details.interface, &mut outcome);
                }
            }
        }

        for interface in desired.iter().filter(|iface| wanted.contains_key(iface.name.as_str())) {
            match outcome.record(self.configure(interface)) {
                Some(ConfigureOutcome::Configured { .. }) => outcome.counts.configured += 1,
                Some(ConfigureOutcome::Pending { .. }) => outcome.counts.pending += 1,
                _ => {}
            }
        }

        self.publish_all_states();
        outcome
    }
}
