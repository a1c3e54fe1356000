//! Desired-state resource models.
//!
//! These are the north-bound records the configurators consume. They are
//! plain serde values so a snapshot can be loaded from YAML or JSON.

pub mod bfd;
pub mod interfaces;
pub mod nat;
pub mod stn;

pub use bfd::{BfdAuthKey, BfdAuthentication, BfdAuthenticationType, BfdEchoFunction, BfdSession};
pub use interfaces::{
    AfPacketLink, Interface, InterfaceKind, InterfaceLink, MemifLink, MemifMode, RxMode,
    RxModeSettings, TapLink, Unnumbered, VxlanLink,
};
pub use nat::{
    AddressPool, DNatConfig, IdentityMapping, LocalIp, Nat44Global, NatInterface, Protocol,
    StaticMapping, TwiceNatMode, VirtualReassembly,
};
pub use stn::StnRule;
