//! VPP agent control plane.
//!
//! Reconciles a desired network state into a VPP dataplane. Each resource
//! kind has a configurator that translates create, modify and delete events
//! into dataplane calls and records what it applied in an index registry.
//!
//! # Architecture
//!
//! ```text
//! [snapshot / changes] ──> [VppAgent] ──> [configurators] ──> [Dataplane] ──> [VPP]
//!                              │                                   │
//!                              └──── [InterfaceStateUpdater] <─────┘ notifications
//! ```
//!
//! # Key Components
//!
//! - [`agent::VppAgent`]: event loop, change dispatch and the full resync
//! - [`interfaces`]: interface configurator and state publisher
//! - [`afpacket`]: AF-Packet interfaces bound to Linux host interfaces
//! - [`bfd`]: BFD sessions, authentication keys and echo function
//! - [`nat`]: NAT44 global configuration and DNAT
//! - [`stn`]: steal-the-NIC rules
//! - [`resync`]: resync outcome bookkeeping
//!
//! Resources that reference a missing dependency (an interface that does not
//! exist yet, an unnumbered donor, a VXLAN multicast interface) are kept in a
//! pending cache and applied when the dependency is created.

pub mod afpacket;
pub mod agent;
pub mod audit;
pub mod bfd;
pub mod config;
pub mod diff;
pub mod interfaces;
pub mod nat;
pub mod resync;
pub mod stn;

pub use agent::{AgentCommand, Change, ChangeEvent, VppAgent};
pub use config::{AgentConfig, DesiredState, ResyncStrategy};
pub use resync::{ResourceKind, ResyncCounts, ResyncOutcome, ResyncReport};
