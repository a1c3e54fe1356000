//! Building blocks shared by the VPP agent configurators.
//!
//! - [`IndexRegistry`]: concurrent `name <-> handle` index with metadata
//! - [`PendingCache`]: resources waiting on, or bound to, another resource
//! - [`ConfigError`]: structured error carrying resource and operation
//!
//! # Example
//!
//! ```
//! use vpp_agent_common::{IndexRegistry, PendingCache};
//!
//! let registry: IndexRegistry<()> = IndexRegistry::new("interfaces");
//! let mut pending: PendingCache<String> = PendingCache::new();
//!
//! // The donor does not exist yet, so the dependent waits.
//! if registry.handle_of("loop1").is_none() {
//!     pending.defer("tap1", "loop1", "tap1 config".to_string());
//! }
//!
//! registry.register("loop1", 1, ());
//! let ready = pending.resolve_created("loop1");
//! assert_eq!(ready.len(), 1);
//! ```

mod error;
mod pending;
mod registry;

pub use error::{
    ConfigError, ConfigResult, ConfigureOutcome, DataplaneContext, ErrorCause, ErrorKind,
    Operation, ParseContext,
};
pub use pending::PendingCache;
pub use registry::{IndexEntry, IndexRegistry};
