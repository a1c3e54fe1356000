//! Dataplane handler traits.
//!
//! One trait per binary API method group. Every call is synchronous: it
//! returns only after the dataplane replied, and a non-zero retval comes back
//! as a [`DataplaneError`](crate::DataplaneError).
//!
//! - [`interface`]: interface lifecycle and properties
//! - [`bfd`]: BFD sessions, keys and the echo function
//! - [`nat`]: NAT44 global settings and DNAT mappings
//! - [`stn`]: steal-the-NIC rules

pub mod bfd;
pub mod interface;
pub mod nat;
pub mod stn;

pub use bfd::BfdApi;
pub use interface::InterfaceApi;
pub use nat::NatApi;
pub use stn::StnApi;

/// A handler implementing every method group.
pub trait Dataplane: InterfaceApi + BfdApi + NatApi + StnApi {}

impl<T> Dataplane for T where T: InterfaceApi + BfdApi + NatApi + StnApi {}
