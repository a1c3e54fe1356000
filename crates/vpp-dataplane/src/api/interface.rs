//! Interface method group.

use crate::error::DataplaneResult;
use crate::model::{AfPacketLink, MemifLink, RxModeSettings, TapLink, VxlanLink};
use crate::types::{InterfaceDetails, SwIfIndex};
use std::collections::{BTreeMap, HashMap};
use vpp_types::{IpPrefix, MacAddress};

pub trait InterfaceApi: Send + Sync {
    fn add_tap_interface(&self, name: &str, tap: &TapLink) -> DataplaneResult<SwIfIndex>;
    fn delete_tap_interface(&self, name: &str, sw_if_index: SwIfIndex, version: u32) -> DataplaneResult<()>;

    fn register_memif_socket_filename(&self, filename: &str, socket_id: u32) -> DataplaneResult<()>;
    fn add_memif_interface(&self, name: &str, memif: &MemifLink, socket_id: u32) -> DataplaneResult<SwIfIndex>;
    fn delete_memif_interface(&self, name: &str, sw_if_index: SwIfIndex) -> DataplaneResult<()>;

    /// Creates a tunnel. `multicast_if` is [`NO_INTERFACE`](crate::NO_INTERFACE) for unicast.
    fn add_vxlan_tunnel(
        &self,
        name: &str,
        vrf: u32,
        multicast_if: SwIfIndex,
        vxlan: &VxlanLink,
    ) -> DataplaneResult<SwIfIndex>;
    fn delete_vxlan_tunnel(
        &self,
        name: &str,
        sw_if_index: SwIfIndex,
        vrf: u32,
        vxlan: &VxlanLink,
    ) -> DataplaneResult<()>;

    fn add_loopback_interface(&self, name: &str) -> DataplaneResult<SwIfIndex>;
    fn delete_loopback_interface(&self, name: &str, sw_if_index: SwIfIndex) -> DataplaneResult<()>;

    fn add_af_packet_interface(
        &self,
        name: &str,
        mac: Option<&MacAddress>,
        afpacket: &AfPacketLink,
    ) -> DataplaneResult<SwIfIndex>;
    fn delete_af_packet_interface(
        &self,
        name: &str,
        sw_if_index: SwIfIndex,
        afpacket: &AfPacketLink,
    ) -> DataplaneResult<()>;

    fn interface_admin_up(&self, sw_if_index: SwIfIndex) -> DataplaneResult<()>;
    fn interface_admin_down(&self, sw_if_index: SwIfIndex) -> DataplaneResult<()>;

    fn set_interface_tag(&self, tag: &str, sw_if_index: SwIfIndex) -> DataplaneResult<()>;
    fn remove_interface_tag(&self, tag: &str, sw_if_index: SwIfIndex) -> DataplaneResult<()>;

    fn set_interface_as_dhcp_client(&self, sw_if_index: SwIfIndex, hostname: &str) -> DataplaneResult<()>;
    fn unset_interface_as_dhcp_client(&self, sw_if_index: SwIfIndex, hostname: &str) -> DataplaneResult<()>;

    fn add_container_ip(&self, sw_if_index: SwIfIndex, address: &IpPrefix) -> DataplaneResult<()>;
    fn del_container_ip(&self, sw_if_index: SwIfIndex, address: &IpPrefix) -> DataplaneResult<()>;

    fn add_interface_ip(&self, sw_if_index: SwIfIndex, address: &IpPrefix) -> DataplaneResult<()>;
    fn del_interface_ip(&self, sw_if_index: SwIfIndex, address: &IpPrefix) -> DataplaneResult<()>;

    /// Borrows the addresses of `donor` for `sw_if_index`.
    fn set_unnumbered_ip(&self, sw_if_index: SwIfIndex, donor: SwIfIndex) -> DataplaneResult<()>;
    fn unset_unnumbered_ip(&self, sw_if_index: SwIfIndex) -> DataplaneResult<()>;

    fn set_interface_mac(&self, sw_if_index: SwIfIndex, mac: &MacAddress) -> DataplaneResult<()>;
    fn set_interface_mtu(&self, sw_if_index: SwIfIndex, mtu: u32) -> DataplaneResult<()>;
    fn set_rx_mode(&self, sw_if_index: SwIfIndex, rx_mode: &RxModeSettings) -> DataplaneResult<()>;

    fn create_vrf(&self, vrf: u32) -> DataplaneResult<()>;
    fn create_vrf_ipv6(&self, vrf: u32) -> DataplaneResult<()>;
    fn set_interface_vrf(&self, sw_if_index: SwIfIndex, vrf: u32) -> DataplaneResult<()>;
    fn set_interface_vrf_ipv6(&self, sw_if_index: SwIfIndex, vrf: u32) -> DataplaneResult<()>;

    fn dump_interfaces(&self) -> DataplaneResult<BTreeMap<SwIfIndex, InterfaceDetails>>;
    /// Registered memif sockets as `filename -> socket id`.
    fn dump_memif_socket_details(&self) -> DataplaneResult<HashMap<String, u32>>;
}
