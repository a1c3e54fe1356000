//! BFD method group.

use crate::error::DataplaneResult;
use crate::model::BfdAuthKey;
use crate::types::{BfdUdpSession, SwIfIndex};
use vpp_types::IpAddress;

pub trait BfdApi: Send + Sync {
    fn add_bfd_udp_session(&self, session: &BfdUdpSession) -> DataplaneResult<()>;
    fn modify_bfd_udp_session(&self, session: &BfdUdpSession) -> DataplaneResult<()>;
    fn delete_bfd_udp_session(
        &self,
        sw_if_index: SwIfIndex,
        source: &IpAddress,
        destination: &IpAddress,
    ) -> DataplaneResult<()>;
    fn dump_bfd_sessions(&self) -> DataplaneResult<Vec<BfdUdpSession>>;

    fn set_bfd_udp_auth_key(&self, key: &BfdAuthKey) -> DataplaneResult<()>;
    fn delete_bfd_udp_auth_key(&self, key: &BfdAuthKey) -> DataplaneResult<()>;
    /// Dumped keys carry no name and no secret.
    fn dump_bfd_auth_keys(&self) -> DataplaneResult<Vec<BfdAuthKey>>;

    fn add_bfd_echo_function(&self, sw_if_index: SwIfIndex) -> DataplaneResult<()>;
    fn delete_bfd_echo_function(&self) -> DataplaneResult<()>;
    fn get_bfd_echo_source(&self) -> DataplaneResult<Option<SwIfIndex>>;
}
