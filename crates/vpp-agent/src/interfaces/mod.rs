//! Interface configurator and interface state publisher.

mod configurator;
mod state;

pub use configurator::{InterfaceConfigurator, InterfaceConfiguratorConfig, InterfaceConfiguratorStats};
pub use state::{
    link_speed_bps, Duplex, InterfaceNotification, InterfaceState, InterfaceStateUpdater,
    InterfaceStatistics, InterfaceStatus, LogStatePublisher, NotificationKind, StatePublisher,
};

use vpp_agent_common::IndexRegistry;
use vpp_dataplane::model::Interface;

/// Interface name to `sw_if_index`, with the last applied config as metadata.
///
/// Shared by every configurator and by the state watcher.
pub type InterfaceRegistry = IndexRegistry<Interface>;

/// Name the resync engine registers an uncorrelated interface under before
/// removing it.
pub const TEMP_INTERFACE_NAME: &str = "temp-if-name";
