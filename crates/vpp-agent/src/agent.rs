//! The agent: every configurator behind one event loop.
//!
//! [`VppAgent`] owns the interface registry and the configurators that read
//! it. Changes arrive as [`ChangeEvent`]s. Interface changes are chained into
//! the STN and NAT dependency caches, so a rule waiting for an interface is
//! applied as soon as the interface is configured. A full snapshot is
//! reconciled with [`VppAgent::resync`].

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::bfd::BfdConfigurator;
use crate::config::{AgentConfig, DesiredState, ResyncStrategy};
use crate::interfaces::{
    InterfaceConfigurator, InterfaceConfiguratorConfig, InterfaceRegistry, InterfaceStateUpdater,
    StatePublisher,
};
use crate::afpacket::LinuxSupport;
use crate::nat::NatConfigurator;
use crate::resync::{verify_config_presence, ResourceKind, ResyncOutcome, ResyncReport};
use crate::stn::StnConfigurator;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vpp_agent_common::{ConfigResult, ConfigureOutcome};
use vpp_dataplane::model::{
    BfdAuthKey, BfdEchoFunction, BfdSession, DNatConfig, Interface, Nat44Global,
    StnRule,
};
use vpp_dataplane::{Dataplane, SwIfIndex};

const SOURCE: &str = "VppAgent";

/// A change to one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T> {
    Create(T),
    Modify { old: T, new: T },
    Delete(T),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Interface(Change<Interface>),
    BfdSession(Change<BfdSession>),
    BfdAuthKey(Change<BfdAuthKey>),
    BfdEchoFunction(Change<BfdEchoFunction>),
    StnRule(Change<StnRule>),
    Nat44Global(Change<Nat44Global>),
    DNat(Change<DNatConfig>),
    /// A Linux host interface appeared.
    LinuxInterfaceCreated(String),
    /// A Linux host interface disappeared.
    LinuxInterfaceDeleted(String),
}

impl ChangeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Interface(_) => "interface",
            ChangeEvent::BfdSession(_) => "bfd-session",
            ChangeEvent::BfdAuthKey(_) => "bfd-auth-key",
            ChangeEvent::BfdEchoFunction(_) => "bfd-echo-function",
            ChangeEvent::StnRule(_) => "stn-rule",
            ChangeEvent::Nat44Global(_) => "nat44-global",
            ChangeEvent::DNat(_) => "dnat",
            ChangeEvent::LinuxInterfaceCreated(_) => "linux-interface-created",
            ChangeEvent::LinuxInterfaceDeleted(_) => "linux-interface-deleted",
        }
    }
}

/// Input of [`VppAgent::run`].
#[derive(Debug, Clone)]
pub enum AgentCommand {
    Apply(ChangeEvent),
    Resync(DesiredState),
}

fn count_configured(outcome: &mut ResyncOutcome, result: ConfigResult<ConfigureOutcome>) {
    match outcome.record(result) {
        Some(ConfigureOutcome::Configured { .. }) => outcome.counts.configured += 1,
        Some(ConfigureOutcome::Pending { .. }) => outcome.counts.pending += 1,
        Some(ConfigureOutcome::Skipped) | None => {}
    }
}

pub struct VppAgent {
    config: AgentConfig,
    dataplane: Arc<dyn Dataplane>,
    registry: Arc<InterfaceRegistry>,
    state: Arc<InterfaceStateUpdater>,
    interfaces: InterfaceConfigurator,
    bfd: BfdConfigurator,
    stn: StnConfigurator,
    nat: NatConfigurator,
}

impl std::fmt::Debug for VppAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VppAgent")
            .field("config", &self.config)
            .field("interfaces_count", &self.registry.len())
            .field("bfd", &self.bfd)
            .field("stn", &self.stn)
            .field("nat", &self.nat)
            .finish()
    }
}

impl VppAgent {
    pub fn new(config: AgentConfig, dataplane: Arc<dyn Dataplane>, publisher: Arc<dyn StatePublisher>) -> Self {
        let registry = Arc::new(InterfaceRegistry::new("interfaces"));
        let state = Arc::new(InterfaceStateUpdater::new(registry.clone(), publisher));
        let linux = config.linux_support.then(LinuxSupport::new);
        let mut interfaces = InterfaceConfigurator::new(
            InterfaceConfiguratorConfig {
                default_mtu: config.default_mtu,
            },
            dataplane.clone(),
            registry.clone(),
            linux,
        );
        interfaces.set_state_updater(state.clone());

        let record = AuditRecord::new(AuditCategory::SystemLifecycle, SOURCE, "agent_initialized")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "default_mtu": config.default_mtu,
                "linux_support": config.linux_support,
                "resync_strategy": format!("{:?}", config.resync_strategy),
            }));
        audit_log!(record);

        VppAgent {
            bfd: BfdConfigurator::new(dataplane.clone(), registry.clone()),
            stn: StnConfigurator::new(dataplane.clone(), registry.clone()),
            nat: NatConfigurator::new(dataplane.clone(), registry.clone()),
            config,
            dataplane,
            registry,
            state,
            interfaces,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InterfaceRegistry> {
        &self.registry
    }

    /// The state watcher fed by dataplane notifications.
    pub fn state_updater(&self) -> Arc<InterfaceStateUpdater> {
        self.state.clone()
    }

    pub fn interfaces(&self) -> &InterfaceConfigurator {
        &self.interfaces
    }

    pub fn bfd(&self) -> &BfdConfigurator {
        &self.bfd
    }

    pub fn stn(&self) -> &StnConfigurator {
        &self.stn
    }

    pub fn nat(&self) -> &NatConfigurator {
        &self.nat
    }

    fn interface_created(&mut self, name: &str) -> ConfigResult<()> {
        let stn = self.stn.resolve_created_interface(name);
        let nat = self.nat.resolve_created_interface(name);
        stn.and(nat)
    }

    fn interface_deleted(&mut self, name: &str) {
        self.stn.resolve_deleted_interface(name);
        self.nat.resolve_deleted_interface(name);
    }

    /// Propagates handle changes between two registry snapshots.
    fn chain_handle_changes(
        &mut self,
        before: &HashMap<String, SwIfIndex>,
        after: &HashMap<String, SwIfIndex>,
    ) -> ConfigResult<()> {
        for (name, handle) in before {
            if after.get(name) != Some(handle) {
                self.interface_deleted(name);
            }
        }
        let mut result = Ok(());
        for (name, handle) in after {
            if before.get(name) != Some(handle) {
                result = result.and(self.interface_created(name));
            }
        }
        result
    }

    /// Every registered interface with its handle.
    fn snapshot(&self) -> HashMap<String, SwIfIndex> {
        self.registry
            .entries()
            .into_iter()
            .map(|entry| (entry.name, entry.handle))
            .collect()
    }

    /// Applies an interface change and passes every interface it created,
    /// recreated or removed on the way (VXLANs waiting on a multicast
    /// interface, AF-Packets on a host) to the STN and NAT configurators.
    fn apply_interface(&mut self, change: Change<Interface>) -> ConfigResult<()> {
        let before = self.snapshot();
        let result = match change {
            Change::Create(interface) => self.interfaces.configure(&interface).map(|_| ()),
            Change::Modify { old, new } => self.interfaces.modify(&old, &new),
            Change::Delete(interface) => self.interfaces.delete(&interface),
        };
        let after = self.snapshot();
        result.and(self.chain_handle_changes(&before, &after))
    }

    /// Applies one change. Errors are returned after logging. The resource
    /// stays in whatever state the failed step left it.
    pub fn apply(&mut self, event: ChangeEvent) -> ConfigResult<()> {
        let kind = event.kind();
        debug!("[{}] applying {} change", SOURCE, kind);
        let result = match event {
            ChangeEvent::Interface(change) => self.apply_interface(change),
            ChangeEvent::BfdSession(change) => match change {
                Change::Create(session) => self.bfd.configure_session(&session).map(|_| ()),
                Change::Modify { old, new } => self.bfd.modify_session(&old, &new),
                Change::Delete(session) => self.bfd.delete_session(&session),
            },
            ChangeEvent::BfdAuthKey(change) => match change {
                Change::Create(key) => self.bfd.configure_key(&key).map(|_| ()),
                Change::Modify { old, new } => self.bfd.modify_key(&old, &new),
                Change::Delete(key) => self.bfd.delete_key(&key),
            },
            ChangeEvent::BfdEchoFunction(change) => match change {
                Change::Create(echo) => self.bfd.configure_echo(&echo).map(|_| ()),
                Change::Modify { old, new } => self.bfd.modify_echo(&old, &new),
                Change::Delete(echo) => self.bfd.delete_echo(&echo),
            },
            ChangeEvent::StnRule(change) => match change {
                Change::Create(rule) => self.stn.configure(&rule).map(|_| ()),
                Change::Modify { old, new } => self.stn.modify(&old, &new),
                Change::Delete(rule) => self.stn.delete(&rule),
            },
            ChangeEvent::Nat44Global(change) => match change {
                Change::Create(global) => self.nat.configure_global(&global).map(|_| ()),
                Change::Modify { old, new } => self.nat.modify_global(&old, &new),
                Change::Delete(global) => self.nat.delete_global(&global),
            },
            ChangeEvent::DNat(change) => match change {
                Change::Create(dnat) => self.nat.configure_dnat(&dnat).map(|_| ()),
                Change::Modify { old, new } => self.nat.modify_dnat(&old, &new),
                Change::Delete(dnat) => self.nat.delete_dnat(&dnat),
            },
            ChangeEvent::LinuxInterfaceCreated(host) => {
                let before = self.snapshot();
                let resolved = self.interfaces.resolve_created_linux_interface(&host);
                let after = self.snapshot();
                resolved.and(self.chain_handle_changes(&before, &after))
            }
            ChangeEvent::LinuxInterfaceDeleted(host) => {
                let before = self.snapshot();
                let resolved = self.interfaces.resolve_deleted_linux_interface(&host);
                let after = self.snapshot();
                resolved.and(self.chain_handle_changes(&before, &after))
            }
        };
        if let Err(err) = &result {
            error!("[{}] {} change failed: {}", SOURCE, kind, err);
        }
        result
    }

    /// Configures `desired` without reading the dataplane first.
    fn cold_start(&mut self, desired: &DesiredState, report: &mut ResyncReport) {
        let mut outcome = ResyncOutcome::default();
        for interface in &desired.interfaces {
            let before = self.snapshot();
            let result = self.interfaces.configure(interface);
            let after = self.snapshot();
            outcome.record(self.chain_handle_changes(&before, &after));
            count_configured(&mut outcome, result);
        }
        report.push(ResourceKind::Interface, outcome);

        let mut outcome = ResyncOutcome::default();
        for key in &desired.bfd_auth_keys {
            count_configured(&mut outcome, self.bfd.configure_key(key));
        }
        report.push(ResourceKind::BfdAuthKey, outcome);

        let mut outcome = ResyncOutcome::default();
        for session in &desired.bfd_sessions {
            count_configured(&mut outcome, self.bfd.configure_session(session));
        }
        report.push(ResourceKind::BfdSession, outcome);

        let mut outcome = ResyncOutcome::default();
        if let Some(echo) = desired.bfd_echo_functions.first() {
            count_configured(&mut outcome, self.bfd.configure_echo(echo));
        }
        report.push(ResourceKind::BfdEchoFunction, outcome);

        let mut outcome = ResyncOutcome::default();
        for rule in &desired.stn_rules {
            count_configured(&mut outcome, self.stn.configure(rule));
        }
        report.push(ResourceKind::StnRule, outcome);

        let mut outcome = ResyncOutcome::default();
        if let Some(global) = &desired.nat44_global {
            count_configured(&mut outcome, self.nat.configure_global(global));
        }
        report.push(ResourceKind::Nat44Global, outcome);

        let mut outcome = ResyncOutcome::default();
        for dnat in &desired.dnats {
            count_configured(&mut outcome, self.nat.configure_dnat(dnat));
        }
        report.push(ResourceKind::DNat, outcome);
    }

    /// Reconciles the dataplane with a full snapshot.
    ///
    /// Resource kinds are processed in dependency order: interfaces, BFD
    /// keys, sessions and echo, STN rules, the NAT44 global config, DNATs.
    /// Errors are collected per kind and do not stop later kinds.
    pub fn resync(&mut self, desired: &DesiredState) -> ResyncReport {
        let correlation_id = format!("resync-{}", Utc::now().timestamp_millis());
        let mut report = ResyncReport::new(correlation_id.clone());
        info!("[{}] resync {} started", SOURCE, correlation_id);

        let record = AuditRecord::new(AuditCategory::Resync, SOURCE, "resync_start")
            .with_outcome(AuditOutcome::InProgress)
            .with_correlation_id(&correlation_id)
            .with_details(serde_json::json!({
                "interfaces": desired.interfaces.len(),
                "bfd_sessions": desired.bfd_sessions.len(),
                "stn_rules": desired.stn_rules.len(),
                "dnats": desired.dnats.len(),
            }));
        audit_log!(record);

        let empty_dataplane = self.config.resync_strategy == ResyncStrategy::OptimizeColdStart
            && match verify_config_presence(self.dataplane.as_ref()) {
                Ok(present) => !present,
                Err(err) => {
                    warn!("[{}] cannot verify dataplane content, running full resync: {}", SOURCE, err);
                    false
                }
            };

        if empty_dataplane {
            info!("[{}] dataplane is empty, skipping the dump", SOURCE);
            report.skipped = true;
            self.cold_start(desired, &mut report);
        } else {
            report.push(ResourceKind::Interface, self.interfaces.resync(&desired.interfaces));
            report.push(ResourceKind::BfdAuthKey, self.bfd.resync_keys(&desired.bfd_auth_keys));
            report.push(ResourceKind::BfdSession, self.bfd.resync_sessions(&desired.bfd_sessions));
            report.push(
                ResourceKind::BfdEchoFunction,
                self.bfd.resync_echo(&desired.bfd_echo_functions),
            );
            report.push(ResourceKind::StnRule, self.stn.resync(&desired.stn_rules));
            report.push(
                ResourceKind::Nat44Global,
                self.nat.resync_global(desired.nat44_global.as_ref()),
            );
            report.push(ResourceKind::DNat, self.nat.resync_dnat(&desired.dnats));
        }

        let totals = report.totals();
        let errors: Vec<String> = report.errors().map(ToString::to_string).collect();
        let outcome = if errors.is_empty() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        let record = AuditRecord::new(AuditCategory::Resync, SOURCE, "resync_end")
            .with_outcome(outcome)
            .with_correlation_id(&correlation_id)
            .with_details(serde_json::json!({
                "skipped": report.skipped,
                "registered": totals.registered,
                "configured": totals.configured,
                "modified": totals.modified,
                "deleted": totals.deleted,
                "pending": totals.pending,
                "errors": errors,
            }));
        audit_log!(record);
        report
    }

    /// One line per registry, for diagnostics.
    pub fn dump(&self) -> Vec<String> {
        vec![
            format!("interfaces: {} registered", self.registry.len()),
            format!(
                "bfd: {} sessions, {} keys, {} echo",
                self.bfd.sessions().len(),
                self.bfd.keys().len(),
                self.bfd.echo().len()
            ),
            format!("stn: {:?}", self.stn.stats()),
            format!("nat: {:?}", self.nat.stats()),
        ]
    }

    /// Applies commands until `shutdown` fires or every sender is gone, then
    /// hands the agent back.
    pub async fn run(mut self, mut commands: mpsc::Receiver<AgentCommand>, shutdown: CancellationToken) -> Self {
        let record = AuditRecord::new(AuditCategory::AdminAction, SOURCE, "event_loop_started")
            .with_outcome(AuditOutcome::Success);
        audit_log!(record);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(AgentCommand::Apply(event)) => {
                        // Already logged by apply.
                        let _ = self.apply(event);
                    }
                    Some(AgentCommand::Resync(desired)) => {
                        let report = self.resync(&desired);
                        if !report.is_clean() {
                            warn!(
                                "[{}] resync {} finished with {} errors",
                                SOURCE,
                                report.correlation_id,
                                report.errors().count()
                            );
                        }
                    }
                    None => break,
                },
            }
        }

        info!("[{}] event loop stopped", SOURCE);
        let record = AuditRecord::new(AuditCategory::AdminAction, SOURCE, "event_loop_stopped")
            .with_outcome(AuditOutcome::Success);
        audit_log!(record);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::LogStatePublisher;
    use crate::stn::stn_identifier;
    use pretty_assertions::assert_eq;
    use vpp_dataplane::model::{AfPacketLink, InterfaceLink, NatInterface, VxlanLink};
    use vpp_dataplane::InMemoryDataplane;

    fn setup(config: AgentConfig) -> (VppAgent, Arc<InMemoryDataplane>) {
        let dataplane = Arc::new(InMemoryDataplane::new());
        let agent = VppAgent::new(config, dataplane.clone(), Arc::new(LogStatePublisher));
        (agent, dataplane)
    }

    fn loopback(name: &str, ip: &str) -> Interface {
        let mut interface = Interface::new(name, InterfaceLink::Loopback);
        interface.enabled = true;
        interface.ip_addresses = vec![ip.to_string()];
        interface
    }

    fn stn_rule(interface: &str) -> StnRule {
        StnRule {
            rule_name: "rule1".to_string(),
            interface: interface.to_string(),
            ip_address: "10.1.1.3/32".to_string(),
        }
    }

    #[test]
    fn test_interface_create_resolves_stn() {
        let (mut agent, dataplane) = setup(AgentConfig::default());
        agent.apply(ChangeEvent::StnRule(Change::Create(stn_rule("loop1")))).unwrap();
        assert!(agent.stn().unstored_index_exists_for(&stn_identifier("loop1")));

        agent
            .apply(ChangeEvent::Interface(Change::Create(loopback("loop1", "10.1.1.1/24"))))
            .unwrap();
        assert!(agent.stn().index_exists_for(&stn_identifier("loop1")));
        assert_eq!(dataplane.stn_rules().len(), 1);

        agent
            .apply(ChangeEvent::Interface(Change::Delete(loopback("loop1", "10.1.1.1/24"))))
            .unwrap();
        assert!(agent.stn().unstored_index_exists_for(&stn_identifier("loop1")));
    }

    #[test]
    fn test_interface_create_resolves_nat() {
        let (mut agent, _) = setup(AgentConfig::default());
        let nat_interface = NatInterface {
            name: "loop1".to_string(),
            is_inside: true,
            output_feature: false,
        };
        let global = Nat44Global {
            nat_interfaces: vec![nat_interface.clone()],
            ..Default::default()
        };
        agent.apply(ChangeEvent::Nat44Global(Change::Create(global))).unwrap();
        assert!(agent.nat().is_interface_pending(&nat_interface));

        agent
            .apply(ChangeEvent::Interface(Change::Create(loopback("loop1", "10.1.1.1/24"))))
            .unwrap();
        assert!(!agent.nat().is_interface_pending(&nat_interface));
    }

    #[test]
    fn test_vxlan_resolved_through_multicast_reaches_stn_and_nat() {
        let (mut agent, dataplane) = setup(AgentConfig::default());
        let nat_interface = NatInterface {
            name: "vxlan1".to_string(),
            is_inside: false,
            output_feature: false,
        };
        let global = Nat44Global {
            nat_interfaces: vec![nat_interface.clone()],
            ..Default::default()
        };
        agent.apply(ChangeEvent::Nat44Global(Change::Create(global))).unwrap();
        agent.apply(ChangeEvent::StnRule(Change::Create(stn_rule("vxlan1")))).unwrap();

        let tunnel = Interface::new(
            "vxlan1",
            InterfaceLink::Vxlan(VxlanLink {
                src_address: "10.0.0.1".to_string(),
                dst_address: "10.0.0.2".to_string(),
                vni: 100,
                multicast: Some("mcast0".to_string()),
            }),
        );
        agent.apply(ChangeEvent::Interface(Change::Create(tunnel))).unwrap();
        assert!(!agent.registry().contains("vxlan1"));

        let mcast = loopback("mcast0", "239.1.1.1/24");
        agent
            .apply(ChangeEvent::Interface(Change::Create(mcast.clone())))
            .unwrap();
        assert!(agent.registry().contains("vxlan1"));
        assert!(!agent.stn().unstored_index_exists_for(&stn_identifier("vxlan1")));
        assert_eq!(dataplane.stn_rules().len(), 1);
        assert!(!agent.nat().is_interface_pending(&nat_interface));

        agent
            .apply(ChangeEvent::Interface(Change::Delete(mcast)))
            .unwrap();
        assert!(!agent.registry().contains("vxlan1"));
        assert!(agent.interfaces().is_vxlan_pending("vxlan1"));
        assert!(agent.stn().unstored_index_exists_for(&stn_identifier("vxlan1")));
        assert!(agent.nat().is_interface_pending(&nat_interface));
    }

    #[test]
    fn test_linux_interface_events_chain_afpacket() {
        let config = AgentConfig {
            linux_support: true,
            ..Default::default()
        };
        let (mut agent, _) = setup(config);
        let afpacket = Interface::new(
            "afp1",
            InterfaceLink::AfPacket(AfPacketLink {
                host_if_name: "veth1".to_string(),
            }),
        );
        agent.apply(ChangeEvent::Interface(Change::Create(afpacket))).unwrap();
        agent.apply(ChangeEvent::StnRule(Change::Create(stn_rule("afp1")))).unwrap();
        assert!(!agent.registry().contains("afp1"));

        agent
            .apply(ChangeEvent::LinuxInterfaceCreated("veth1".to_string()))
            .unwrap();
        assert!(agent.registry().contains("afp1"));
        assert!(agent.stn().index_exists_for(&stn_identifier("afp1")));

        agent
            .apply(ChangeEvent::LinuxInterfaceDeleted("veth1".to_string()))
            .unwrap();
        assert!(!agent.registry().contains("afp1"));
        assert!(agent.stn().unstored_index_exists_for(&stn_identifier("afp1")));
    }

    #[test]
    fn test_resync_order_and_idempotency() {
        let (mut agent, dataplane) = setup(AgentConfig::default());
        let desired = DesiredState {
            interfaces: vec![loopback("loop1", "10.1.1.1/24")],
            stn_rules: vec![stn_rule("loop1")],
            ..Default::default()
        };
        let report = agent.resync(&desired);
        assert!(report.is_clean());
        assert!(!report.skipped);
        let kinds: Vec<ResourceKind> = report.kinds.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Interface,
                ResourceKind::BfdAuthKey,
                ResourceKind::BfdSession,
                ResourceKind::BfdEchoFunction,
                ResourceKind::StnRule,
                ResourceKind::Nat44Global,
                ResourceKind::DNat,
            ]
        );
        assert_eq!(report.outcome(ResourceKind::StnRule).unwrap().counts.configured, 1);

        dataplane.clear_calls();
        let report = agent.resync(&desired);
        assert!(report.is_clean());
        assert_eq!(report.totals().changes(), 0);
        assert!(dataplane.mutating_calls().is_empty());
    }

    #[test]
    fn test_cold_start_skips_dump() {
        let config = AgentConfig {
            resync_strategy: ResyncStrategy::OptimizeColdStart,
            ..Default::default()
        };
        let (mut agent, dataplane) = setup(config);
        let desired = DesiredState {
            interfaces: vec![loopback("loop1", "10.1.1.1/24")],
            stn_rules: vec![stn_rule("loop1")],
            ..Default::default()
        };
        let report = agent.resync(&desired);
        assert!(report.skipped);
        assert!(report.is_clean());
        assert_eq!(report.totals().configured, 2);
        assert!(agent.registry().contains("loop1"));
        assert!(!dataplane.call_names().contains(&"dump_stn_rules"));
    }

    #[tokio::test]
    async fn test_run_applies_commands_until_closed() {
        let (agent, _) = setup(AgentConfig::default());
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(agent.run(rx, shutdown.clone()));

        tx.send(AgentCommand::Apply(ChangeEvent::Interface(Change::Create(loopback(
            "loop1",
            "10.1.1.1/24",
        )))))
        .await
        .unwrap();
        tx.send(AgentCommand::Resync(DesiredState::default())).await.unwrap();
        drop(tx);

        let agent = handle.await.unwrap();
        assert!(!agent.registry().contains("loop1"));
        assert!(!shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (agent, _) = setup(AgentConfig::default());
        let (_tx, rx) = mpsc::channel::<AgentCommand>(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(agent.run(rx, shutdown.clone()));
        shutdown.cancel();
        let agent = handle.await.unwrap();
        assert_eq!(agent.registry().len(), 0);
    }
}
