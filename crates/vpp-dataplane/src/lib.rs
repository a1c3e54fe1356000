//! Dataplane handler for the VPP agent.
//!
//! The agent reaches VPP through synchronous binary API calls. This crate
//! defines that boundary:
//!
//! - [`api`]: one handler trait per method group (interfaces, BFD, NAT, STN)
//! - [`model`]: the desired-state resource records the agent configures
//! - [`types`]: request contexts, dump details and pushed notifications
//! - [`error`]: return value handling
//! - [`memory`]: [`InMemoryDataplane`], a handler that keeps VPP state in memory
//!
//! # Example
//!
//! ```
//! use vpp_dataplane::{InMemoryDataplane, InterfaceApi};
//!
//! let dataplane = InMemoryDataplane::new();
//! let idx = dataplane.add_loopback_interface("loop1").unwrap();
//! dataplane.interface_admin_up(idx).unwrap();
//! assert!(dataplane.interface_details(idx).unwrap().interface.enabled);
//! ```

pub mod api;
pub mod error;
pub mod memory;
pub mod model;
pub mod types;

pub use api::{BfdApi, Dataplane, InterfaceApi, NatApi, StnApi};
pub use error::{DataplaneError, DataplaneResult, RetvalExt, VppRetval};
pub use memory::{DataplaneCall, InMemoryDataplane};
pub use types::{SwIfIndex, NO_INTERFACE};
