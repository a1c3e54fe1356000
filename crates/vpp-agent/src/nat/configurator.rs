//! NatConfigurator implementation.

use super::types::{
    identity_mapping_identifier, identity_request, pool_context, static_mapping_identifier,
    static_request, take_match, DumpedMapping, StaticRequest,
};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::diff::diff_sets;
use crate::interfaces::InterfaceRegistry;
use crate::resync::ResyncOutcome;
use crate::{audit_log, debug_log, info_log, warn_log};
use std::collections::HashMap;
use std::sync::Arc;
use vpp_agent_common::{
    ConfigError, ConfigResult, ConfigureOutcome, DataplaneContext, Operation, PendingCache,
};
use vpp_dataplane::model::{
    AddressPool, DNatConfig, IdentityMapping, Nat44Global, NatInterface, StaticMapping,
    VirtualReassembly,
};
use vpp_dataplane::types::{AddressPoolContext, IdentityMappingContext};
use vpp_dataplane::{Dataplane, NatApi, SwIfIndex, NO_INTERFACE};

const SOURCE: &str = "NatConfigurator";

const GLOBAL_RESOURCE: &str = "nat44-global";

/// NAT configurator statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NatConfiguratorStats {
    pub interfaces_enabled: u64,
    pub interfaces_deferred: u64,
    pub pools_added: u64,
    pub mappings_added: u64,
    pub mappings_removed: u64,
}

/// Cache key of a NAT interface: the same interface may be enabled on both
/// sides.
fn nat_interface_key(interface: &NatInterface) -> String {
    let side = if interface.is_inside { "in" } else { "out" };
    format!("{}/{}", interface.name, side)
}

fn reassembly_target(reassembly: Option<VirtualReassembly>) -> VirtualReassembly {
    reassembly.unwrap_or(VirtualReassembly::DEFAULT)
}

#[derive(Debug, Clone)]
struct AppliedStatic {
    label: String,
    request: StaticRequest,
}

#[derive(Debug, Clone)]
struct AppliedIdentity {
    label: String,
    request: IdentityMappingContext,
}

/// Configures the NAT44 global configuration and labelled DNAT groups.
///
/// NAT interfaces whose interface is not registered wait in a not-enabled
/// cache and are enabled by [`resolve_created_interface`]. Static and identity
/// mappings are indexed by their identifier with the request that was sent,
/// so removal does not depend on the interface registry.
///
/// [`resolve_created_interface`]: NatConfigurator::resolve_created_interface
pub struct NatConfigurator {
    dataplane: Arc<dyn Dataplane>,
    interfaces: Arc<InterfaceRegistry>,
    global: Option<Nat44Global>,
    /// Bound entries are enabled in the dataplane.
    nat_interfaces: PendingCache<NatInterface>,
    dnats: HashMap<String, DNatConfig>,
    static_mappings: HashMap<String, AppliedStatic>,
    identity_mappings: HashMap<String, AppliedIdentity>,
    stats: NatConfiguratorStats,
}

impl std::fmt::Debug for NatConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatConfigurator")
            .field("global", &self.global.is_some())
            .field("interfaces_enabled", &self.nat_interfaces.bound_len())
            .field("interfaces_pending", &self.nat_interfaces.len())
            .field("dnats_count", &self.dnats.len())
            .field("static_mappings_count", &self.static_mappings.len())
            .field("identity_mappings_count", &self.identity_mappings.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl NatConfigurator {
    pub fn new(dataplane: Arc<dyn Dataplane>, interfaces: Arc<InterfaceRegistry>) -> Self {
        NatConfigurator {
            dataplane,
            interfaces,
            global: None,
            nat_interfaces: PendingCache::new(),
            dnats: HashMap::new(),
            static_mappings: HashMap::new(),
            identity_mappings: HashMap::new(),
            stats: NatConfiguratorStats::default(),
        }
    }

    pub fn stats(&self) -> &NatConfiguratorStats {
        &self.stats
    }

    pub fn global(&self) -> Option<&Nat44Global> {
        self.global.as_ref()
    }

    pub fn is_dnat_registered(&self, label: &str) -> bool {
        self.dnats.contains_key(label)
    }

    pub fn is_static_mapping_registered(&self, id: &str) -> bool {
        self.static_mappings.contains_key(id)
    }

    pub fn is_identity_mapping_registered(&self, id: &str) -> bool {
        self.identity_mappings.contains_key(id)
    }

    /// True when the NAT interface waits for its interface to be created.
    pub fn is_interface_pending(&self, interface: &NatInterface) -> bool {
        self.nat_interfaces.is_pending(&nat_interface_key(interface))
    }

    // ========================================================================
    // Global configuration
    // ========================================================================

    fn enable_interface(&mut self, op: Operation, interface: &NatInterface) -> ConfigResult<bool> {
        let key = nat_interface_key(interface);
        let Some(sw_if_index) = self.interfaces.handle_of(&interface.name) else {
            self.nat_interfaces.defer(key, &interface.name, interface.clone());
            self.stats.interfaces_deferred += 1;
            audit_log!(AuditRecord::new(AuditCategory::PendingTransition, SOURCE, "defer_nat_interface")
                .with_outcome(AuditOutcome::Deferred)
                .with_object_id(&interface.name)
                .with_object_type("nat_interface")
                .with_details(serde_json::json!({ "is_inside": interface.is_inside })));
            return Ok(false);
        };
        self.enable_in_dataplane(op, interface, sw_if_index)?;
        self.nat_interfaces.bind(key, &interface.name, interface.clone());
        Ok(true)
    }

    fn enable_in_dataplane(&mut self, op: Operation, interface: &NatInterface, sw_if_index: SwIfIndex) -> ConfigResult<()> {
        if interface.output_feature {
            self.dataplane
                .enable_nat44_interface_output(sw_if_index, interface.is_inside)
                .context(op, &interface.name, "enable_nat44_interface_output")?;
        } else {
            self.dataplane
                .enable_nat44_interface(sw_if_index, interface.is_inside)
                .context(op, &interface.name, "enable_nat44_interface")?;
        }
        self.stats.interfaces_enabled += 1;
        debug_log!(SOURCE, interface = %interface.name, is_inside = interface.is_inside, "nat interface enabled");
        Ok(())
    }

    fn disable_in_dataplane(&self, op: Operation, resource: &str, sw_if_index: SwIfIndex, is_inside: bool, output_feature: bool) -> ConfigResult<()> {
        if output_feature {
            self.dataplane
                .disable_nat44_interface_output(sw_if_index, is_inside)
                .context(op, resource, "disable_nat44_interface_output")
        } else {
            self.dataplane
                .disable_nat44_interface(sw_if_index, is_inside)
                .context(op, resource, "disable_nat44_interface")
        }
    }

    fn disable_interface(&mut self, op: Operation, interface: &NatInterface) -> ConfigResult<()> {
        let key = nat_interface_key(interface);
        if !self.nat_interfaces.is_pending(&key) {
            match self.interfaces.handle_of(&interface.name) {
                Some(sw_if_index) => self.disable_in_dataplane(
                    op,
                    &interface.name,
                    sw_if_index,
                    interface.is_inside,
                    interface.output_feature,
                )?,
                None => warn_log!(SOURCE, interface = %interface.name, "interface not registered, nat feature not disabled"),
            }
        }
        self.nat_interfaces.remove(&key);
        Ok(())
    }

    fn add_pool(&mut self, op: Operation, pool: &AddressPool) -> ConfigResult<()> {
        let ctx = pool_context(op, pool)?;
        self.dataplane
            .add_nat44_address_pool(&ctx)
            .context(op, GLOBAL_RESOURCE, "add_nat44_address_pool")?;
        self.stats.pools_added += 1;
        Ok(())
    }

    fn del_pool(&mut self, op: Operation, pool: &AddressPool) -> ConfigResult<()> {
        let ctx = pool_context(op, pool)?;
        self.dataplane
            .del_nat44_address_pool(&ctx)
            .context(op, GLOBAL_RESOURCE, "del_nat44_address_pool")
    }

    fn set_reassembly(&self, op: Operation, ipv4: Option<VirtualReassembly>, ipv6: Option<VirtualReassembly>) -> ConfigResult<()> {
        if let Some(reassembly) = ipv4 {
            self.dataplane
                .set_virtual_reassembly_ipv4(&reassembly)
                .context(op, GLOBAL_RESOURCE, "set_virtual_reassembly_ipv4")?;
        }
        if let Some(reassembly) = ipv6 {
            self.dataplane
                .set_virtual_reassembly_ipv6(&reassembly)
                .context(op, GLOBAL_RESOURCE, "set_virtual_reassembly_ipv6")?;
        }
        Ok(())
    }

    pub fn configure_global(&mut self, global: &Nat44Global) -> ConfigResult<ConfigureOutcome> {
        let op = Operation::Configure;
        for pool in &global.address_pools {
            pool_context(op, pool)?;
        }

        self.dataplane
            .set_nat44_forwarding(global.forwarding)
            .context(op, GLOBAL_RESOURCE, "set_nat44_forwarding")?;
        for interface in &global.nat_interfaces {
            self.enable_interface(op, interface)?;
        }
        for pool in &global.address_pools {
            self.add_pool(op, pool)?;
        }
        self.set_reassembly(op, global.virtual_reassembly_ipv4, global.virtual_reassembly_ipv6)?;

        self.global = Some(global.clone());
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "configure_nat44_global")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(GLOBAL_RESOURCE)
            .with_details(serde_json::json!({
                "forwarding": global.forwarding,
                "interfaces": global.nat_interfaces.len(),
                "address_pools": global.address_pools.len(),
            })));
        Ok(ConfigureOutcome::Configured { handle: 0 })
    }

    pub fn modify_global(&mut self, old: &Nat44Global, new: &Nat44Global) -> ConfigResult<()> {
        let op = Operation::Modify;
        for pool in &new.address_pools {
            pool_context(op, pool)?;
        }

        if old.forwarding != new.forwarding {
            self.dataplane
                .set_nat44_forwarding(new.forwarding)
                .context(op, GLOBAL_RESOURCE, "set_nat44_forwarding")?;
        }

        let (disabled, enabled) = diff_sets(&old.nat_interfaces, &new.nat_interfaces);
        for interface in &disabled {
            self.disable_interface(op, interface)?;
        }
        for interface in &enabled {
            self.enable_interface(op, interface)?;
        }

        let old_pools: Vec<AddressPool> = old.address_pools.iter().map(AddressPool::normalized).collect();
        let new_pools: Vec<AddressPool> = new.address_pools.iter().map(AddressPool::normalized).collect();
        let (removed, added) = diff_sets(&old_pools, &new_pools);
        for pool in &removed {
            self.del_pool(op, pool)?;
        }
        for pool in &added {
            self.add_pool(op, pool)?;
        }

        let ipv4 = reassembly_target(new.virtual_reassembly_ipv4);
        let ipv6 = reassembly_target(new.virtual_reassembly_ipv6);
        self.set_reassembly(
            op,
            (ipv4 != reassembly_target(old.virtual_reassembly_ipv4)).then_some(ipv4),
            (ipv6 != reassembly_target(old.virtual_reassembly_ipv6)).then_some(ipv6),
        )?;

        self.global = Some(new.clone());
        audit_log!(AuditRecord::new(AuditCategory::ResourceModify, SOURCE, "modify_nat44_global")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(GLOBAL_RESOURCE));
        Ok(())
    }

    /// Removes everything the global config set. Reassembly goes back to the
    /// dataplane defaults.
    pub fn delete_global(&mut self, global: &Nat44Global) -> ConfigResult<()> {
        let op = Operation::Delete;
        for interface in &global.nat_interfaces {
            self.disable_interface(op, interface)?;
        }
        for pool in &global.address_pools {
            self.del_pool(op, pool)?;
        }
        if global.forwarding {
            self.dataplane
                .set_nat44_forwarding(false)
                .context(op, GLOBAL_RESOURCE, "set_nat44_forwarding")?;
        }
        let reset = |reassembly: Option<VirtualReassembly>| {
            reassembly
                .filter(|r| *r != VirtualReassembly::DEFAULT)
                .map(|_| VirtualReassembly::DEFAULT)
        };
        self.set_reassembly(op, reset(global.virtual_reassembly_ipv4), reset(global.virtual_reassembly_ipv6))?;

        self.global = None;
        audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "delete_nat44_global")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(GLOBAL_RESOURCE));
        Ok(())
    }

    /// Enables the NAT interfaces waiting for `interface`.
    pub fn resolve_created_interface(&mut self, interface: &str) -> ConfigResult<()> {
        let op = Operation::ResolveCreated;
        let Some(sw_if_index) = self.interfaces.handle_of(interface) else {
            return Ok(());
        };
        let mut first_error = None;
        for (key, nat_interface) in self.nat_interfaces.resolve_created(interface) {
            match self.enable_in_dataplane(op, &nat_interface, sw_if_index) {
                Ok(()) => {
                    info_log!(SOURCE, interface, "pending nat interface enabled");
                    self.nat_interfaces.bind(key, interface, nat_interface);
                }
                Err(err) => {
                    self.nat_interfaces.defer(key, interface, nat_interface);
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Moves the NAT interfaces of a deleted interface back to the
    /// not-enabled cache.
    pub fn resolve_deleted_interface(&mut self, interface: &str) {
        for (key, nat_interface) in self.nat_interfaces.resolve_deleted(interface) {
            debug_log!(SOURCE, interface, "nat interface back to pending");
            self.nat_interfaces.defer(key, interface, nat_interface);
        }
    }

    /// Reconciles the global configuration. A missing desired config means
    /// forwarding off, no NAT interfaces, no pools and default reassembly.
    pub fn resync_global(&mut self, desired: Option<&Nat44Global>) -> ResyncOutcome {
        let op = Operation::Resync;
        let mut outcome = ResyncOutcome::default();
        self.nat_interfaces.clear();
        self.global = None;

        let Some(dump) = outcome.record(
            self.dataplane
                .nat44_global_config_dump()
                .context(op, GLOBAL_RESOURCE, "nat44_global_config_dump"),
        ) else {
            return outcome;
        };
        let empty = Nat44Global::default();
        let wanted = desired.unwrap_or(&empty);

        if dump.forwarding != wanted.forwarding {
            let set = self
                .dataplane
                .set_nat44_forwarding(wanted.forwarding)
                .context(op, GLOBAL_RESOURCE, "set_nat44_forwarding");
            if outcome.record(set).is_some() {
                outcome.counts.modified += 1;
            }
        }

        let mut matched = vec![false; wanted.nat_interfaces.len()];
        for actual in &dump.interfaces {
            let position = (0..wanted.nat_interfaces.len()).find(|i| {
                let candidate = &wanted.nat_interfaces[*i];
                !matched[*i]
                    && self.interfaces.handle_of(&candidate.name) == Some(actual.sw_if_index)
                    && candidate.is_inside == actual.is_inside
                    && candidate.output_feature == actual.output_feature
            });
            match position {
                Some(i) => {
                    matched[i] = true;
                    let interface = &wanted.nat_interfaces[i];
                    self.nat_interfaces
                        .bind(nat_interface_key(interface), &interface.name, interface.clone());
                    outcome.counts.registered += 1;
                }
                None => {
                    let resource = self
                        .interfaces
                        .name_of(actual.sw_if_index)
                        .unwrap_or_else(|| actual.sw_if_index.to_string());
                    let disabled = self.disable_in_dataplane(
                        op,
                        &resource,
                        actual.sw_if_index,
                        actual.is_inside,
                        actual.output_feature,
                    );
                    if outcome.record(disabled).is_some() {
                        outcome.counts.deleted += 1;
                    }
                }
            }
        }
        for (interface, _) in wanted.nat_interfaces.iter().zip(&matched).filter(|(_, m)| !**m) {
            match outcome.record(self.enable_interface(op, interface)) {
                Some(true) => outcome.counts.configured += 1,
                Some(false) => outcome.counts.pending += 1,
                None => {}
            }
        }

        let wanted_pools: Vec<AddressPoolContext> = wanted
            .address_pools
            .iter()
            .filter_map(|pool| outcome.record(pool_context(op, pool)))
            .collect();
        let (obsolete, missing) = diff_sets(&dump.address_pools, &wanted_pools);
        for pool in &obsolete {
            let removed = self
                .dataplane
                .del_nat44_address_pool(pool)
                .context(op, GLOBAL_RESOURCE, "del_nat44_address_pool");
            if outcome.record(removed).is_some() {
                outcome.counts.deleted += 1;
            }
        }
        for pool in &missing {
            let added = self
                .dataplane
                .add_nat44_address_pool(pool)
                .context(op, GLOBAL_RESOURCE, "add_nat44_address_pool");
            if outcome.record(added).is_some() {
                outcome.counts.configured += 1;
            }
        }
        outcome.counts.registered += wanted_pools.len() - missing.len();

        let ipv4 = reassembly_target(wanted.virtual_reassembly_ipv4);
        let ipv6 = reassembly_target(wanted.virtual_reassembly_ipv6);
        if ipv4 != dump.virtual_reassembly_ipv4 || ipv6 != dump.virtual_reassembly_ipv6 {
            let reassembly = self.set_reassembly(
                op,
                (ipv4 != dump.virtual_reassembly_ipv4).then_some(ipv4),
                (ipv6 != dump.virtual_reassembly_ipv6).then_some(ipv6),
            );
            if outcome.record(reassembly).is_some() {
                outcome.counts.modified += 1;
            }
        }

        self.global = desired.cloned();
        outcome
    }

    // ========================================================================
    // DNAT
    // ========================================================================

    fn external_index(&self, op: Operation, label: &str, interface: Option<&str>) -> ConfigResult<SwIfIndex> {
        match interface {
            Some(name) if !name.is_empty() => self.interfaces.handle_of(name).ok_or_else(|| {
                ConfigError::validation(op, label, format!("interface {} is not registered", name))
            }),
            _ => Ok(NO_INTERFACE),
        }
    }

    fn static_request_for(&self, op: Operation, label: &str, mapping: &StaticMapping) -> ConfigResult<StaticRequest> {
        let external = self.external_index(op, label, mapping.external_interface.as_deref())?;
        static_request(op, label, mapping, external)
    }

    fn identity_request_for(&self, op: Operation, label: &str, mapping: &IdentityMapping) -> ConfigResult<IdentityMappingContext> {
        let sw_if_index = self.external_index(op, label, mapping.addressed_interface.as_deref())?;
        identity_request(op, label, mapping, sw_if_index)
    }

    fn send_static(&self, op: Operation, label: &str, request: &StaticRequest, add: bool) -> ConfigResult<()> {
        match (request, add) {
            (StaticRequest::Single(ctx), true) => self
                .dataplane
                .add_nat44_static_mapping(ctx)
                .context(op, label, "add_nat44_static_mapping"),
            (StaticRequest::Single(ctx), false) => self
                .dataplane
                .del_nat44_static_mapping(ctx)
                .context(op, label, "del_nat44_static_mapping"),
            (StaticRequest::LoadBalanced(ctx), true) => self
                .dataplane
                .add_nat44_static_mapping_lb(ctx)
                .context(op, label, "add_nat44_static_mapping_lb"),
            (StaticRequest::LoadBalanced(ctx), false) => self
                .dataplane
                .del_nat44_static_mapping_lb(ctx)
                .context(op, label, "del_nat44_static_mapping_lb"),
        }
    }

    fn add_static(&mut self, op: Operation, label: &str, mapping: &StaticMapping) -> ConfigResult<()> {
        let request = self.static_request_for(op, label, mapping)?;
        self.send_static(op, label, &request, true)?;
        self.stats.mappings_added += 1;
        self.static_mappings.insert(
            static_mapping_identifier(mapping),
            AppliedStatic {
                label: label.to_string(),
                request,
            },
        );
        Ok(())
    }

    fn remove_static(&mut self, op: Operation, label: &str, mapping: &StaticMapping) -> ConfigResult<()> {
        let id = static_mapping_identifier(mapping);
        let Some(applied) = self.static_mappings.get(&id) else {
            warn_log!(SOURCE, label, id = %id, "static mapping not registered");
            return Ok(());
        };
        self.send_static(op, label, &applied.request, false)?;
        self.static_mappings.remove(&id);
        self.stats.mappings_removed += 1;
        Ok(())
    }

    fn add_identity(&mut self, op: Operation, label: &str, mapping: &IdentityMapping) -> ConfigResult<()> {
        let request = self.identity_request_for(op, label, mapping)?;
        self.dataplane
            .add_nat44_identity_mapping(&request)
            .context(op, label, "add_nat44_identity_mapping")?;
        self.stats.mappings_added += 1;
        self.identity_mappings.insert(
            identity_mapping_identifier(mapping),
            AppliedIdentity {
                label: label.to_string(),
                request,
            },
        );
        Ok(())
    }

    fn remove_identity(&mut self, op: Operation, label: &str, mapping: &IdentityMapping) -> ConfigResult<()> {
        let id = identity_mapping_identifier(mapping);
        let Some(applied) = self.identity_mappings.get(&id) else {
            warn_log!(SOURCE, label, id = %id, "identity mapping not registered");
            return Ok(());
        };
        self.dataplane
            .del_nat44_identity_mapping(&applied.request)
            .context(op, label, "del_nat44_identity_mapping")?;
        self.identity_mappings.remove(&id);
        self.stats.mappings_removed += 1;
        Ok(())
    }

    pub fn configure_dnat(&mut self, dnat: &DNatConfig) -> ConfigResult<ConfigureOutcome> {
        let op = Operation::Configure;
        if dnat.label.is_empty() {
            return Err(ConfigError::validation(op, "dnat", "dnat label is empty"));
        }
        let label = dnat.label.as_str();
        for mapping in &dnat.st_mappings {
            self.add_static(op, label, mapping)?;
        }
        for mapping in &dnat.id_mappings {
            self.add_identity(op, label, mapping)?;
        }
        self.dnats.insert(dnat.label.clone(), dnat.clone());
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "configure_dnat")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(label)
            .with_object_type("dnat")
            .with_details(serde_json::json!({
                "static_mappings": dnat.st_mappings.len(),
                "identity_mappings": dnat.id_mappings.len(),
            })));
        Ok(ConfigureOutcome::Configured { handle: 0 })
    }

    /// Removes mappings missing from `new` and adds mappings missing from
    /// `old`. Unchanged mappings are left alone.
    pub fn modify_dnat(&mut self, old: &DNatConfig, new: &DNatConfig) -> ConfigResult<()> {
        let op = Operation::Modify;
        if old.label != new.label {
            self.delete_dnat(old)?;
            return self.configure_dnat(new).map(|_| ());
        }
        let label = new.label.as_str();

        for mapping in old.st_mappings.iter().filter(|m| !new.st_mappings.contains(m)) {
            self.remove_static(op, label, mapping)?;
        }
        for mapping in old.id_mappings.iter().filter(|m| !new.id_mappings.contains(m)) {
            self.remove_identity(op, label, mapping)?;
        }
        for mapping in new.st_mappings.iter().filter(|m| !old.st_mappings.contains(m)) {
            self.add_static(op, label, mapping)?;
        }
        for mapping in new.id_mappings.iter().filter(|m| !old.id_mappings.contains(m)) {
            self.add_identity(op, label, mapping)?;
        }

        self.dnats.insert(new.label.clone(), new.clone());
        audit_log!(AuditRecord::new(AuditCategory::ResourceModify, SOURCE, "modify_dnat")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(label)
            .with_object_type("dnat"));
        Ok(())
    }

    pub fn delete_dnat(&mut self, dnat: &DNatConfig) -> ConfigResult<()> {
        let op = Operation::Delete;
        let label = dnat.label.as_str();
        for mapping in &dnat.st_mappings {
            self.remove_static(op, label, mapping)?;
        }
        for mapping in &dnat.id_mappings {
            self.remove_identity(op, label, mapping)?;
        }
        self.dnats.remove(label);
        audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "delete_dnat")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(label)
            .with_object_type("dnat"));
        Ok(())
    }

    /// Reconciles every DNAT mapping in the dataplane with `desired`.
    ///
    /// Each desired mapping takes the first dumped mapping that matches it
    /// and removes it from the remaining set. Whatever remains in the dump is
    /// deleted before the unmatched desired mappings are added.
    pub fn resync_dnat(&mut self, desired: &[DNatConfig]) -> ResyncOutcome {
        let op = Operation::Resync;
        let mut outcome = ResyncOutcome::default();
        self.dnats.clear();
        self.static_mappings.clear();
        self.identity_mappings.clear();

        let Some(dump) = outcome.record(self.dataplane.nat44_dnat_dump().context(op, "dnat", "nat44_dnat_dump")) else {
            return outcome;
        };
        let mut remaining: Vec<DumpedMapping> = dump
            .static_mappings
            .into_iter()
            .map(|ctx| DumpedMapping::Static(StaticRequest::Single(ctx)))
            .chain(
                dump.lb_static_mappings
                    .into_iter()
                    .map(|ctx| DumpedMapping::Static(StaticRequest::LoadBalanced(ctx))),
            )
            .chain(dump.identity_mappings.into_iter().map(DumpedMapping::Identity))
            .collect();

        let mut to_add: Vec<(String, DumpedMapping)> = Vec::new();
        for dnat in desired {
            let label = dnat.label.as_str();
            let mut matched_all = true;
            for mapping in &dnat.st_mappings {
                let Some(request) = outcome.record(self.static_request_for(op, label, mapping)) else {
                    matched_all = false;
                    continue;
                };
                let wanted = DumpedMapping::Static(request.clone());
                if take_match(&mut remaining, &wanted) {
                    self.static_mappings.insert(
                        static_mapping_identifier(mapping),
                        AppliedStatic {
                            label: label.to_string(),
                            request,
                        },
                    );
                } else {
                    matched_all = false;
                    to_add.push((static_mapping_identifier(mapping), wanted));
                }
            }
            for mapping in &dnat.id_mappings {
                let Some(request) = outcome.record(self.identity_request_for(op, label, mapping)) else {
                    matched_all = false;
                    continue;
                };
                let wanted = DumpedMapping::Identity(request.clone());
                if take_match(&mut remaining, &wanted) {
                    self.identity_mappings.insert(
                        identity_mapping_identifier(mapping),
                        AppliedIdentity {
                            label: label.to_string(),
                            request,
                        },
                    );
                } else {
                    matched_all = false;
                    to_add.push((identity_mapping_identifier(mapping), wanted));
                }
            }
            if matched_all {
                outcome.counts.registered += 1;
            } else if self.static_mappings.values().any(|m| m.label == label)
                || self.identity_mappings.values().any(|m| m.label == label)
            {
                outcome.counts.modified += 1;
            } else {
                outcome.counts.configured += 1;
            }
            self.dnats.insert(dnat.label.clone(), dnat.clone());
        }

        for obsolete in remaining {
            let label = obsolete.tag().to_string();
            let removed = match &obsolete {
                DumpedMapping::Static(request) => self.send_static(op, &label, request, false),
                DumpedMapping::Identity(ctx) => self
                    .dataplane
                    .del_nat44_identity_mapping(ctx)
                    .context(op, &label, "del_nat44_identity_mapping"),
            };
            if outcome.record(removed).is_some() {
                debug_log!(SOURCE, label = %label, "obsolete dnat mapping removed");
                outcome.counts.deleted += 1;
            }
        }

        for (id, wanted) in to_add {
            match wanted {
                DumpedMapping::Static(request) => {
                    let label = match &request {
                        StaticRequest::Single(ctx) => ctx.tag.clone(),
                        StaticRequest::LoadBalanced(ctx) => ctx.tag.clone(),
                    };
                    if outcome.record(self.send_static(op, &label, &request, true)).is_some() {
                        self.static_mappings.insert(id, AppliedStatic { label, request });
                    }
                }
                DumpedMapping::Identity(request) => {
                    let added = self
                        .dataplane
                        .add_nat44_identity_mapping(&request)
                        .context(op, &request.tag, "add_nat44_identity_mapping");
                    if outcome.record(added).is_some() {
                        self.identity_mappings.insert(
                            id,
                            AppliedIdentity {
                                label: request.tag.clone(),
                                request,
                            },
                        );
                    }
                }
            }
        }
        outcome
    }
}
