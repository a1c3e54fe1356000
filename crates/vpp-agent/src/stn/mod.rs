//! STN (steal-the-NIC) rules.
//!
//! A rule punts traffic for one address arriving on an interface to the host
//! stack. Rules are indexed by [`stn_identifier`] of their interface. A rule
//! whose interface is not registered yet is kept "unstored" and added once the
//! interface appears.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::interfaces::InterfaceRegistry;
use crate::resync::ResyncOutcome;
use crate::{audit_log, debug_log, info_log, warn_log};
use std::sync::Arc;
use vpp_agent_common::{
    ConfigError, ConfigResult, ConfigureOutcome, DataplaneContext, Operation, ParseContext,
    PendingCache,
};
use vpp_dataplane::model::StnRule;
use vpp_dataplane::{Dataplane, StnApi, SwIfIndex};
use vpp_types::{strip_mask, IpAddress};

const SOURCE: &str = "StnConfigurator";

const STN_ID_PREFIX: &str = "stn-iface-";

/// Index key of the rule attached to `interface`.
pub fn stn_identifier(interface: &str) -> String {
    format!("{}{}", STN_ID_PREFIX, interface)
}

/// A rule as the dataplane holds it, with the interface name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StnRuleEntry {
    /// `None` when the handle is not in the interface registry.
    pub interface: Option<String>,
    pub sw_if_index: SwIfIndex,
    pub ip_address: IpAddress,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StnConfiguratorStats {
    pub added: u64,
    pub removed: u64,
    pub deferred: u64,
}

fn validate(operation: Operation, rule: &StnRule) -> ConfigResult<IpAddress> {
    if rule.interface.is_empty() {
        return Err(ConfigError::validation(operation, &rule.rule_name, "stn rule has no interface"));
    }
    if rule.ip_address.is_empty() {
        return Err(ConfigError::validation(operation, &rule.rule_name, "stn rule has no IP address"));
    }
    strip_mask(&rule.ip_address)
        .parse::<IpAddress>()
        .parse_context(operation, &rule.rule_name)
}

pub struct StnConfigurator {
    dataplane: Arc<dyn Dataplane>,
    interfaces: Arc<InterfaceRegistry>,
    /// Bound entries are in the dataplane, pending ones are unstored.
    rules: PendingCache<StnRule>,
    stats: StnConfiguratorStats,
}

impl std::fmt::Debug for StnConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StnConfigurator")
            .field("stored", &self.rules.bound_len())
            .field("unstored", &self.rules.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl StnConfigurator {
    pub fn new(dataplane: Arc<dyn Dataplane>, interfaces: Arc<InterfaceRegistry>) -> Self {
        StnConfigurator {
            dataplane,
            interfaces,
            rules: PendingCache::new(),
            stats: StnConfiguratorStats::default(),
        }
    }

    pub fn stats(&self) -> &StnConfiguratorStats {
        &self.stats
    }

    /// True when a rule with this identifier is known, stored or not.
    pub fn index_exists_for(&self, id: &str) -> bool {
        self.rules.get(id).is_some()
    }

    /// True when the rule is waiting for its interface.
    pub fn unstored_index_exists_for(&self, id: &str) -> bool {
        self.rules.is_pending(id)
    }

    /// Adds `rule`, or stores it unresolved until its interface exists.
    ///
    /// Rules are indexed by interface, so an interface holds at most one
    /// rule. A rule with another name on an interface that already has one
    /// is a validation error.
    pub fn configure(&mut self, rule: &StnRule) -> ConfigResult<ConfigureOutcome> {
        let op = Operation::Configure;
        let address = validate(op, rule)?;
        let id = stn_identifier(&rule.interface);
        if let Some(existing) = self.rules.get(&id) {
            if existing.rule_name != rule.rule_name {
                return Err(ConfigError::validation(
                    op,
                    &rule.rule_name,
                    format!("interface {} already has stn rule {}", rule.interface, existing.rule_name),
                ));
            }
        }

        let Some(sw_if_index) = self.interfaces.handle_of(&rule.interface) else {
            self.rules.defer(id, &rule.interface, rule.clone());
            self.stats.deferred += 1;
            audit_log!(AuditRecord::new(AuditCategory::PendingTransition, SOURCE, "defer_stn_rule")
                .with_outcome(AuditOutcome::Deferred)
                .with_object_id(&rule.rule_name)
                .with_object_type("stn_rule")
                .with_details(serde_json::json!({ "interface": rule.interface })));
            return Ok(ConfigureOutcome::Pending {
                dependency: rule.interface.clone(),
            });
        };

        self.add_rule(op, rule, sw_if_index, &address)?;
        self.rules.bind(id, &rule.interface, rule.clone());
        Ok(ConfigureOutcome::Configured { handle: sw_if_index })
    }

    fn add_rule(
        &mut self,
        op: Operation,
        rule: &StnRule,
        sw_if_index: SwIfIndex,
        address: &IpAddress,
    ) -> ConfigResult<()> {
        self.dataplane
            .add_stn_rule(sw_if_index, address)
            .context(op, &rule.rule_name, "add_stn_rule")?;
        self.stats.added += 1;
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "add_stn_rule")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(&rule.rule_name)
            .with_object_type("stn_rule")
            .with_details(serde_json::json!({
                "interface": rule.interface,
                "sw_if_index": sw_if_index,
                "ip_address": address.to_string(),
            })));
        Ok(())
    }

    pub fn modify(&mut self, old: &StnRule, new: &StnRule) -> ConfigResult<()> {
        if old == new {
            return Ok(());
        }
        self.delete(old)?;
        self.configure(new).map(|_| ())
    }

    pub fn delete(&mut self, rule: &StnRule) -> ConfigResult<()> {
        let op = Operation::Delete;
        let id = stn_identifier(&rule.interface);
        if self.rules.is_pending(&id) {
            self.rules.remove(&id);
            debug_log!(SOURCE, rule = %rule.rule_name, "unstored stn rule dropped");
            return Ok(());
        }
        let address = validate(op, rule)?;

        match self.interfaces.handle_of(&rule.interface) {
            Some(sw_if_index) => {
                self.dataplane
                    .del_stn_rule(sw_if_index, &address)
                    .context(op, &rule.rule_name, "del_stn_rule")?;
                self.stats.removed += 1;
                audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "del_stn_rule")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(&rule.rule_name)
                    .with_object_type("stn_rule"));
            }
            None => warn_log!(SOURCE, rule = %rule.rule_name, interface = %rule.interface, "interface not registered, rule not removed from dataplane"),
        }
        self.rules.remove(&id);
        Ok(())
    }

    /// Adds every unstored rule waiting for `interface`.
    pub fn resolve_created_interface(&mut self, interface: &str) -> ConfigResult<()> {
        let op = Operation::ResolveCreated;
        let Some(sw_if_index) = self.interfaces.handle_of(interface) else {
            return Ok(());
        };
        let mut first_error = None;
        for (id, rule) in self.rules.resolve_created(interface) {
            let result = validate(op, &rule)
                .and_then(|address| self.add_rule(op, &rule, sw_if_index, &address));
            match result {
                Ok(()) => {
                    info_log!(SOURCE, rule = %rule.rule_name, interface, "unstored stn rule added");
                    self.rules.bind(id, interface, rule);
                }
                Err(err) => {
                    self.rules.defer(id, interface, rule);
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Moves the rules of a deleted interface back to the unstored set. The
    /// dataplane removed them together with the interface.
    pub fn resolve_deleted_interface(&mut self, interface: &str) {
        for (id, rule) in self.rules.resolve_deleted(interface) {
            debug_log!(SOURCE, rule = %rule.rule_name, interface, "stn rule unstored");
            self.rules.defer(id, interface, rule);
        }
    }

    /// Rules currently in the dataplane.
    pub fn dump(&self) -> ConfigResult<Vec<StnRuleEntry>> {
        let rules = self
            .dataplane
            .dump_stn_rules()
            .context(Operation::Resync, "stn-rules", "dump_stn_rules")?;
        Ok(rules
            .into_iter()
            .map(|rule| StnRuleEntry {
                interface: self.interfaces.name_of(rule.sw_if_index),
                sw_if_index: rule.sw_if_index,
                ip_address: rule.ip_address,
            })
            .collect())
    }

    /// Reconciles the dataplane rules with `desired`. Dumped rules with no
    /// desired counterpart are removed, including rules on interfaces the
    /// registry does not know.
    pub fn resync(&mut self, desired: &[StnRule]) -> ResyncOutcome {
        let op = Operation::Resync;
        let mut outcome = ResyncOutcome::default();
        self.rules.clear();

        let Some(dumped) = outcome.record(self.dump()) else {
            return outcome;
        };

        let mut matched = vec![false; desired.len()];
        for entry in dumped {
            let position = entry.interface.as_deref().and_then(|interface| {
                desired.iter().enumerate().position(|(i, rule)| {
                    !matched[i]
                        && rule.interface == interface
                        && strip_mask(&rule.ip_address).parse::<IpAddress>().ok()
                            == Some(entry.ip_address)
                })
            });
            match position {
                Some(i) => {
                    matched[i] = true;
                    let rule = &desired[i];
                    self.rules
                        .bind(stn_identifier(&rule.interface), &rule.interface, rule.clone());
                    outcome.counts.registered += 1;
                }
                None => {
                    let resource = entry
                        .interface
                        .clone()
                        .unwrap_or_else(|| entry.sw_if_index.to_string());
                    let removed = self
                        .dataplane
                        .del_stn_rule(entry.sw_if_index, &entry.ip_address)
                        .context(op, &resource, "del_stn_rule");
                    if outcome.record(removed).is_some() {
                        debug_log!(SOURCE, interface = %resource, ip = %entry.ip_address, "obsolete stn rule removed");
                        outcome.counts.deleted += 1;
                    }
                }
            }
        }

        for (rule, _) in desired.iter().zip(&matched).filter(|(_, matched)| !**matched) {
            match outcome.record(self.configure(rule)) {
                Some(ConfigureOutcome::Configured { .. }) => outcome.counts.configured += 1,
                Some(ConfigureOutcome::Pending { .. }) => outcome.counts.pending += 1,
                _ => {}
            }
        }
        outcome
    }
}
