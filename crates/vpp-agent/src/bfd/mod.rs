//! Bidirectional Forwarding Detection.
//!
//! Three resources share one configurator:
//!
//! - UDP sessions, one per interface, whose source address must be one of
//!   the interface's addresses
//! - authentication keys, which sessions reference by id
//! - the echo function source interface, of which the dataplane has one
//!
//! Sessions referencing a key that is not registered run unauthenticated.
//! Replacing or removing a key re-adds the sessions that use it.

mod configurator;

pub use configurator::{BfdConfigurator, BfdConfiguratorStats};
