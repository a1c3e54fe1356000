//! STN (steal-the-NIC) rule model.

use serde::{Deserialize, Serialize};

/// Punts traffic for `ip_address` arriving on `interface` to the host stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StnRule {
    pub rule_name: String,
    pub interface: String,
    pub ip_address: String,
}
