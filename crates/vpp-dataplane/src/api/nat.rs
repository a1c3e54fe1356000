//! NAT44 method group.

use crate::error::DataplaneResult;
use crate::model::VirtualReassembly;
use crate::types::{
    AddressPoolContext, IdentityMappingContext, Nat44DNatDetails, Nat44GlobalDetails,
    StaticMappingContext, StaticMappingLbContext, SwIfIndex,
};

pub trait NatApi: Send + Sync {
    fn set_nat44_forwarding(&self, enabled: bool) -> DataplaneResult<()>;

    fn enable_nat44_interface(&self, sw_if_index: SwIfIndex, is_inside: bool) -> DataplaneResult<()>;
    fn disable_nat44_interface(&self, sw_if_index: SwIfIndex, is_inside: bool) -> DataplaneResult<()>;
    fn enable_nat44_interface_output(&self, sw_if_index: SwIfIndex, is_inside: bool) -> DataplaneResult<()>;
    fn disable_nat44_interface_output(&self, sw_if_index: SwIfIndex, is_inside: bool) -> DataplaneResult<()>;

    fn add_nat44_address_pool(&self, pool: &AddressPoolContext) -> DataplaneResult<()>;
    fn del_nat44_address_pool(&self, pool: &AddressPoolContext) -> DataplaneResult<()>;

    fn set_virtual_reassembly_ipv4(&self, reassembly: &VirtualReassembly) -> DataplaneResult<()>;
    fn set_virtual_reassembly_ipv6(&self, reassembly: &VirtualReassembly) -> DataplaneResult<()>;

    fn add_nat44_static_mapping(&self, ctx: &StaticMappingContext) -> DataplaneResult<()>;
    fn del_nat44_static_mapping(&self, ctx: &StaticMappingContext) -> DataplaneResult<()>;
    fn add_nat44_static_mapping_lb(&self, ctx: &StaticMappingLbContext) -> DataplaneResult<()>;
    fn del_nat44_static_mapping_lb(&self, ctx: &StaticMappingLbContext) -> DataplaneResult<()>;
    fn add_nat44_identity_mapping(&self, ctx: &IdentityMappingContext) -> DataplaneResult<()>;
    fn del_nat44_identity_mapping(&self, ctx: &IdentityMappingContext) -> DataplaneResult<()>;

    fn nat44_global_config_dump(&self) -> DataplaneResult<Nat44GlobalDetails>;
    fn nat44_dnat_dump(&self) -> DataplaneResult<Nat44DNatDetails>;
}
