//! NAT44: global configuration and DNAT.
//!
//! The global configuration covers forwarding, NAT-enabled interfaces,
//! address pools and virtual reassembly. DNAT configs are labelled groups of
//! static and identity mappings. Mappings have no name of their own, so they
//! are indexed by a deterministic identifier built from their fields (see
//! [`static_mapping_identifier`] and [`identity_mapping_identifier`]).

mod configurator;
mod types;

pub use configurator::{NatConfigurator, NatConfiguratorStats};
pub use types::{identity_mapping_identifier, static_mapping_identifier};
