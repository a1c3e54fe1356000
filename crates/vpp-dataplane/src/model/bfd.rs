//! BFD models.

use serde::{Deserialize, Serialize};

/// A single-hop BFD session, keyed by the interface it runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BfdSession {
    pub interface: String,
    pub source_address: String,
    pub destination_address: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub desired_min_tx_interval: u32,
    #[serde(default)]
    pub required_min_rx_interval: u32,
    #[serde(default)]
    pub detect_multiplier: u32,
    #[serde(default)]
    pub authentication: Option<BfdAuthentication>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BfdAuthentication {
    pub key_id: u32,
    pub advertised_key_id: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BfdAuthenticationType {
    #[default]
    KeyedSha1,
    MeticulousKeyedSha1,
}

impl BfdAuthenticationType {
    /// Wire value of the auth type field (RFC 5880 section 4.1).
    pub fn wire_value(&self) -> u8 {
        match self {
            BfdAuthenticationType::KeyedSha1 => 4,
            BfdAuthenticationType::MeticulousKeyedSha1 => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BfdAuthKey {
    pub name: String,
    pub id: u32,
    #[serde(default)]
    pub authentication_type: BfdAuthenticationType,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BfdEchoFunction {
    pub name: String,
    pub echo_source_interface: String,
}
