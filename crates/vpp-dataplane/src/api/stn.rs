//! STN method group.

use crate::error::DataplaneResult;
use crate::types::{StnRuleDetails, SwIfIndex};
use vpp_types::IpAddress;

pub trait StnApi: Send + Sync {
    fn add_stn_rule(&self, sw_if_index: SwIfIndex, address: &IpAddress) -> DataplaneResult<()>;
    fn del_stn_rule(&self, sw_if_index: SwIfIndex, address: &IpAddress) -> DataplaneResult<()>;
    fn dump_stn_rules(&self) -> DataplaneResult<Vec<StnRuleDetails>>;
}
