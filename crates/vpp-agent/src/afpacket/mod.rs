//! AF-Packet interfaces and their Linux host interfaces.
//!
//! An AF-Packet interface attaches to a Linux host interface. With
//! [`LinuxSupport`] present, creation waits until the host interface is known;
//! without it the dataplane call is issued right away.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::{audit_log, debug_log, info_log};
use std::collections::BTreeSet;
use std::sync::Arc;
use vpp_agent_common::{ConfigResult, DataplaneContext, Operation, PendingCache};
use vpp_dataplane::model::{AfPacketLink, Interface, InterfaceLink};
use vpp_dataplane::{Dataplane, InterfaceApi, SwIfIndex};

const SOURCE: &str = "AfPacketConfigurator";

/// Host interfaces known to exist on the Linux side.
#[derive(Debug, Clone, Default)]
pub struct LinuxSupport {
    hosts: BTreeSet<String>,
}

impl LinuxSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LinuxSupport {
            hosts: hosts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_host(&self, host_if_name: &str) -> bool {
        self.hosts.contains(host_if_name)
    }

    /// Returns false if the host was already known.
    pub fn add_host(&mut self, host_if_name: &str) -> bool {
        self.hosts.insert(host_if_name.to_string())
    }

    /// Returns false if the host was not known.
    pub fn remove_host(&mut self, host_if_name: &str) -> bool {
        self.hosts.remove(host_if_name)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }
}

/// What the interface configurator has to do once a host interface appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfPacketResolution {
    /// Was pending. Configure it.
    Configure(Interface),
    /// Exists on a stale host binding. Delete and configure it again.
    Recreate(Interface),
}

fn host_of(interface: &Interface) -> Option<&AfPacketLink> {
    match &interface.link {
        InterfaceLink::AfPacket(link) => Some(link),
        _ => None,
    }
}

/// Creates and deletes AF-Packet interfaces and tracks their host binding.
///
/// Registration in the interface registry is left to the interface
/// configurator, which owns this one.
pub struct AfPacketConfigurator {
    dataplane: Arc<dyn Dataplane>,
    linux: Option<LinuxSupport>,
    cache: PendingCache<Interface>,
}

impl std::fmt::Debug for AfPacketConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AfPacketConfigurator")
            .field("linux", &self.linux)
            .field("pending", &self.cache.len())
            .field("bound", &self.cache.bound_len())
            .finish()
    }
}

impl AfPacketConfigurator {
    pub fn new(dataplane: Arc<dyn Dataplane>, linux: Option<LinuxSupport>) -> Self {
        AfPacketConfigurator {
            dataplane,
            linux,
            cache: PendingCache::new(),
        }
    }

    pub fn linux_support(&self) -> Option<&LinuxSupport> {
        self.linux.as_ref()
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.cache.is_pending(name)
    }

    /// True when `name` is neither pending nor bound to a host.
    pub fn is_unknown(&self, name: &str) -> bool {
        self.cache.get(name).is_none()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Records a configured AF-Packet as bound to its host.
    pub fn adopt(&mut self, interface: &Interface) {
        if let Some(link) = host_of(interface) {
            self.cache
                .bind(interface.name.clone(), link.host_if_name.clone(), interface.clone());
        }
    }

    /// Creates the interface, or parks it until the host exists.
    ///
    /// Returns `None` when parked. A created interface is bound to its host
    /// only through [`adopt`](Self::adopt), once it is fully configured.
    pub fn configure(&mut self, interface: &Interface, link: &AfPacketLink) -> ConfigResult<Option<SwIfIndex>> {
        let host = link.host_if_name.as_str();
        if let Some(linux) = &self.linux {
            if !linux.has_host(host) {
                self.cache.defer(interface.name.clone(), host, interface.clone());
                audit_log!(AuditRecord::new(AuditCategory::PendingTransition, SOURCE, "defer_af_packet")
                    .with_outcome(AuditOutcome::Deferred)
                    .with_object_id(interface.name.clone())
                    .with_object_type("af_packet")
                    .with_details(serde_json::json!({ "host_if_name": host })));
                return Ok(None);
            }
        }

        let sw_if_index = self
            .dataplane
            .add_af_packet_interface(&interface.name, interface.phys_address.as_ref(), link)
            .context(Operation::Configure, &interface.name, "add_af_packet_interface")?;
        debug_log!(SOURCE, interface = %interface.name, host, sw_if_index, "af_packet created");
        Ok(Some(sw_if_index))
    }

    /// An AF-Packet is recreated when it is still pending or when its host
    /// changes.
    pub fn requires_recreate(&self, old: &Interface, new: &Interface) -> bool {
        if self.cache.is_pending(&old.name) {
            return true;
        }
        match (host_of(old), host_of(new)) {
            (Some(o), Some(n)) => o.host_if_name != n.host_if_name,
            _ => true,
        }
    }

    /// Deletes the interface, or only forgets it when it is still pending.
    pub fn delete(&mut self, name: &str, sw_if_index: Option<SwIfIndex>, link: &AfPacketLink) -> ConfigResult<()> {
        if self.cache.is_pending(name) {
            self.cache.remove(name);
            debug_log!(SOURCE, interface = name, "pending af_packet dropped");
            return Ok(());
        }
        if let Some(sw_if_index) = sw_if_index {
            self.dataplane
                .delete_af_packet_interface(name, sw_if_index, link)
                .context(Operation::Delete, name, "delete_af_packet_interface")?;
        }
        self.cache.remove(name);
        Ok(())
    }

    /// Marks `host` as present and returns the AF-Packets that depend on it.
    ///
    /// Nothing is returned for a host that was already known, so a repeated
    /// notification does not recreate anything.
    pub fn resolve_created(&mut self, host: &str) -> Vec<AfPacketResolution> {
        let Some(linux) = self.linux.as_mut() else {
            return Vec::new();
        };
        if !linux.add_host(host) {
            debug_log!(SOURCE, host, "host already known");
            return Vec::new();
        }
        info_log!(SOURCE, host, "host interface created");

        let mut resolved: Vec<AfPacketResolution> = self
            .cache
            .resolve_deleted(host)
            .into_iter()
            .map(|(_, interface)| AfPacketResolution::Recreate(interface))
            .collect();
        resolved.extend(
            self.cache
                .resolve_created(host)
                .into_iter()
                .map(|(_, interface)| AfPacketResolution::Configure(interface)),
        );
        resolved
    }

    /// Marks `host` as gone and returns the AF-Packets bound to it.
    ///
    /// They are removed from the cache. The caller deletes them from the
    /// dataplane.
    pub fn resolve_deleted(&mut self, host: &str) -> Vec<Interface> {
        let Some(linux) = self.linux.as_mut() else {
            return Vec::new();
        };
        if !linux.remove_host(host) {
            return Vec::new();
        }
        info_log!(SOURCE, host, "host interface deleted");
        self.cache
            .resolve_deleted(host)
            .into_iter()
            .map(|(_, interface)| interface)
            .collect()
    }
}
