//! Agent settings and the desired-state snapshot, both loaded from YAML.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use vpp_dataplane::model::{
    BfdAuthKey, BfdEchoFunction, BfdSession, DNatConfig, Interface, Nat44Global, StnRule,
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_reader(BufReader::new(file)).map_err(|source| LoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// How the startup resync treats an empty dataplane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResyncStrategy {
    #[default]
    Full,
    /// Skip the resync when the dataplane holds nothing but `local0`.
    OptimizeColdStart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// MTU applied to interfaces that leave it at 0. 0 disables it.
    pub default_mtu: u32,
    /// Whether AF-Packet interfaces wait for their host interface to appear.
    pub linux_support: bool,
    pub resync_strategy: ResyncStrategy,
    pub notification_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            default_mtu: 0,
            linux_support: false,
            resync_strategy: ResyncStrategy::Full,
            notification_capacity: 1024,
        }
    }
}

impl AgentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        load_yaml(path.as_ref())
    }
}

/// The full north-bound snapshot handed to a resync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredState {
    pub interfaces: Vec<Interface>,
    pub bfd_sessions: Vec<BfdSession>,
    pub bfd_auth_keys: Vec<BfdAuthKey>,
    pub bfd_echo_functions: Vec<BfdEchoFunction>,
    pub stn_rules: Vec<StnRule>,
    pub nat44_global: Option<Nat44Global>,
    pub dnats: Vec<DNatConfig>,
}

impl DesiredState {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        load_yaml(path.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
            && self.bfd_sessions.is_empty()
            && self.bfd_auth_keys.is_empty()
            && self.bfd_echo_functions.is_empty()
            && self.stn_rules.is_empty()
            && self.nat44_global.is_none()
            && self.dnats.is_empty()
    }
}
