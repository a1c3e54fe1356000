//! BfdConfigurator implementation.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::interfaces::InterfaceRegistry;
use crate::resync::ResyncOutcome;
use crate::{audit_log, debug_log, info_log, warn_log};
use std::sync::Arc;
use vpp_agent_common::{
    ConfigError, ConfigResult, ConfigureOutcome, DataplaneContext, IndexRegistry, Operation,
    ParseContext,
};
use vpp_dataplane::model::{BfdAuthKey, BfdEchoFunction, BfdSession};
use vpp_dataplane::types::BfdUdpSession;
use vpp_dataplane::{BfdApi, Dataplane, SwIfIndex};
use vpp_types::{strip_mask, IpAddress};

const SOURCE: &str = "BfdConfigurator";

/// BFD configurator statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BfdConfiguratorStats {
    /// Sessions added, including re-adds after a key change.
    pub sessions_created: u64,
    pub sessions_modified: u64,
    pub sessions_removed: u64,
    pub keys_set: u64,
    pub keys_removed: u64,
}

/// Session source and destination, parsed.
fn endpoints(operation: Operation, session: &BfdSession) -> ConfigResult<(IpAddress, IpAddress)> {
    let source = session
        .source_address
        .parse::<IpAddress>()
        .parse_context(operation, &session.interface)?;
    let destination = session
        .destination_address
        .parse::<IpAddress>()
        .parse_context(operation, &session.interface)?;
    if source.is_ipv4() != destination.is_ipv4() {
        return Err(ConfigError::validation(
            operation,
            &session.interface,
            "source and destination address families differ",
        ));
    }
    Ok((source, destination))
}

/// Configures single-hop BFD sessions, their authentication keys and the
/// echo function source.
///
/// Sessions are indexed by interface name with the interface handle, keys by
/// name with the key id, the echo function by name with its source interface.
pub struct BfdConfigurator {
    dataplane: Arc<dyn Dataplane>,
    interfaces: Arc<InterfaceRegistry>,
    sessions: IndexRegistry<BfdSession>,
    keys: IndexRegistry<BfdAuthKey>,
    echo: IndexRegistry<BfdEchoFunction>,
    stats: BfdConfiguratorStats,
}

impl std::fmt::Debug for BfdConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BfdConfigurator")
            .field("sessions_count", &self.sessions.len())
            .field("keys_count", &self.keys.len())
            .field("echo_count", &self.echo.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl BfdConfigurator {
    pub fn new(dataplane: Arc<dyn Dataplane>, interfaces: Arc<InterfaceRegistry>) -> Self {
        BfdConfigurator {
            dataplane,
            interfaces,
            sessions: IndexRegistry::new("bfd-sessions"),
            keys: IndexRegistry::new("bfd-auth-keys"),
            echo: IndexRegistry::new("bfd-echo-function"),
            stats: BfdConfiguratorStats::default(),
        }
    }

    pub fn stats(&self) -> &BfdConfiguratorStats {
        &self.stats
    }

    pub fn sessions(&self) -> &IndexRegistry<BfdSession> {
        &self.sessions
    }

    pub fn keys(&self) -> &IndexRegistry<BfdAuthKey> {
        &self.keys
    }

    pub fn echo(&self) -> &IndexRegistry<BfdEchoFunction> {
        &self.echo
    }

    /// Builds the dataplane request for `session`.
    ///
    /// The interface must be registered and must carry the source address.
    /// An authentication key that is not registered is dropped.
    fn session_context(&self, operation: Operation, session: &BfdSession) -> ConfigResult<BfdUdpSession> {
        let name = session.interface.as_str();
        let (sw_if_index, interface) = self.interfaces.lookup_by_name(name).ok_or_else(|| {
            ConfigError::validation(operation, name, format!("interface {} is not registered", name))
        })?;
        let (source, destination) = endpoints(operation, session)?;

        let has_source = interface
            .ip_addresses
            .iter()
            .any(|ip| strip_mask(ip).parse::<IpAddress>().ok() == Some(source));
        if !has_source {
            return Err(ConfigError::validation(
                operation,
                name,
                format!("source address {} is not configured on {}", source, name),
            ));
        }

        let authentication = match session.authentication {
            Some(auth) if self.keys.name_of(auth.key_id).is_some() => Some(auth),
            Some(auth) => {
                info_log!(SOURCE, interface = name, key_id = auth.key_id, "auth key not registered, session is unauthenticated");
                None
            }
            None => None,
        };

        Ok(BfdUdpSession {
            sw_if_index,
            source_address: source,
            destination_address: destination,
            desired_min_tx_interval: session.desired_min_tx_interval,
            required_min_rx_interval: session.required_min_rx_interval,
            detect_multiplier: session.detect_multiplier,
            authentication,
        })
    }

    fn add_session(&mut self, operation: Operation, session: &BfdSession) -> ConfigResult<SwIfIndex> {
        let request = self.session_context(operation, session)?;
        self.dataplane
            .add_bfd_udp_session(&request)
            .context(operation, &session.interface, "add_bfd_udp_session")?;
        self.sessions
            .register(session.interface.clone(), request.sw_if_index, session.clone());
        self.stats.sessions_created += 1;
        Ok(request.sw_if_index)
    }

    fn remove_session(&mut self, operation: Operation, sw_if_index: SwIfIndex, session: &BfdSession) -> ConfigResult<()> {
        let (source, destination) = endpoints(operation, session)?;
        self.dataplane
            .delete_bfd_udp_session(sw_if_index, &source, &destination)
            .context(operation, &session.interface, "delete_bfd_udp_session")?;
        self.stats.sessions_removed += 1;
        Ok(())
    }

    /// Adds the session. A disabled session is not added and returns
    /// `Skipped`.
    pub fn configure_session(&mut self, session: &BfdSession) -> ConfigResult<ConfigureOutcome> {
        if !session.enabled {
            info_log!(SOURCE, interface = %session.interface, "bfd session disabled, not added");
            return Ok(ConfigureOutcome::Skipped);
        }
        let handle = self.add_session(Operation::Configure, session)?;
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "configure_bfd_session")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(&session.interface)
            .with_object_type("bfd_session")
            .with_details(serde_json::json!({
                "source": session.source_address,
                "destination": session.destination_address,
                "authenticated": session.authentication.is_some(),
            })));
        Ok(ConfigureOutcome::Configured { handle })
    }

    /// Updates timers in place. Source and destination cannot change. A
    /// different interface or authentication re-adds the session, and
    /// disabling it removes the session.
    pub fn modify_session(&mut self, old: &BfdSession, new: &BfdSession) -> ConfigResult<()> {
        let op = Operation::Modify;
        if !new.enabled {
            return self.delete_session(old);
        }
        let Some(sw_if_index) = self.sessions.handle_of(&old.interface) else {
            debug_log!(SOURCE, interface = %old.interface, "previous session not found, configuring");
            return self.configure_session(new).map(|_| ());
        };
        if old.interface != new.interface || old.authentication != new.authentication {
            self.delete_session(old)?;
            return self.configure_session(new).map(|_| ());
        }
        if old.source_address != new.source_address || old.destination_address != new.destination_address {
            return Err(ConfigError::validation(
                op,
                &new.interface,
                "bfd session source and destination addresses cannot be modified",
            ));
        }

        let request = self.session_context(op, new)?;
        if request.sw_if_index != sw_if_index {
            return Err(ConfigError::internal(op, &new.interface, "interface handle changed under the session"));
        }
        self.dataplane
            .modify_bfd_udp_session(&request)
            .context(op, &new.interface, "modify_bfd_udp_session")?;
        self.sessions.update_metadata(&new.interface, new.clone());
        self.stats.sessions_modified += 1;
        audit_log!(AuditRecord::new(AuditCategory::ResourceModify, SOURCE, "modify_bfd_session")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(&new.interface)
            .with_object_type("bfd_session"));
        Ok(())
    }

    pub fn delete_session(&mut self, session: &BfdSession) -> ConfigResult<()> {
        let Some(sw_if_index) = self.sessions.handle_of(&session.interface) else {
            warn_log!(SOURCE, interface = %session.interface, "bfd session not registered, nothing to delete");
            return Ok(());
        };
        self.remove_session(Operation::Delete, sw_if_index, session)?;
        self.sessions.unregister(&session.interface);
        audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "delete_bfd_session")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(&session.interface)
            .with_object_type("bfd_session"));
        Ok(())
    }

    /// Registered sessions authenticated with `key_id`.
    fn sessions_using(&self, key_id: u32) -> Vec<(SwIfIndex, BfdSession)> {
        self.sessions
            .entries()
            .into_iter()
            .filter(|entry| entry.metadata.authentication.map(|auth| auth.key_id) == Some(key_id))
            .map(|entry| (entry.handle, entry.metadata))
            .collect()
    }

    pub fn configure_key(&mut self, key: &BfdAuthKey) -> ConfigResult<ConfigureOutcome> {
        let op = Operation::Configure;
        if key.name.is_empty() {
            return Err(ConfigError::validation(op, "bfd-auth-key", "auth key name is empty"));
        }
        self.dataplane
            .set_bfd_udp_auth_key(key)
            .context(op, &key.name, "set_bfd_udp_auth_key")?;
        self.keys.register(key.name.clone(), key.id, key.clone());
        self.stats.keys_set += 1;
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "configure_bfd_auth_key")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(&key.name)
            .with_object_type("bfd_auth_key")
            .with_details(serde_json::json!({ "id": key.id })));
        Ok(ConfigureOutcome::Configured { handle: key.id })
    }

    /// Replaces a key. Sessions using it are removed first and added back
    /// afterwards.
    pub fn modify_key(&mut self, old: &BfdAuthKey, new: &BfdAuthKey) -> ConfigResult<()> {
        let op = Operation::Modify;
        let dependents = self.detach_sessions(op, old.id)?;
        if let Err(err) = self
            .dataplane
            .delete_bfd_udp_auth_key(old)
            .context(op, &old.name, "delete_bfd_udp_auth_key")
        {
            self.restore_sessions(op, dependents);
            return Err(err);
        }
        self.keys.unregister(&old.name);
        if let Err(err) = self.configure_key(new) {
            self.restore_sessions(op, dependents);
            return Err(err);
        }
        self.readd_sessions(op, dependents)
    }

    /// Removes a key. Sessions using it are added back unauthenticated.
    pub fn delete_key(&mut self, key: &BfdAuthKey) -> ConfigResult<()> {
        let op = Operation::Delete;
        let dependents = self.detach_sessions(op, key.id)?;
        if let Err(err) = self
            .dataplane
            .delete_bfd_udp_auth_key(key)
            .context(op, &key.name, "delete_bfd_udp_auth_key")
        {
            self.restore_sessions(op, dependents);
            return Err(err);
        }
        self.keys.unregister(&key.name);
        self.stats.keys_removed += 1;
        audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "delete_bfd_auth_key")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(&key.name)
            .with_object_type("bfd_auth_key"));
        self.readd_sessions(op, dependents)
    }

    /// Removes the sessions authenticated with `key_id` from the dataplane.
    /// They stay registered. If one cannot be removed, the ones already
    /// removed are added back.
    fn detach_sessions(&mut self, op: Operation, key_id: u32) -> ConfigResult<Vec<(SwIfIndex, BfdSession)>> {
        let dependents = self.sessions_using(key_id);
        for (position, (sw_if_index, session)) in dependents.iter().enumerate() {
            if let Err(err) = self.remove_session(op, *sw_if_index, session) {
                self.restore_sessions(op, dependents[..position].to_vec());
                return Err(err);
            }
        }
        Ok(dependents)
    }

    /// Re-adds detached sessions after a failed key change. Sessions that
    /// cannot be added are unregistered.
    fn restore_sessions(&mut self, op: Operation, sessions: Vec<(SwIfIndex, BfdSession)>) {
        if let Err(err) = self.readd_sessions(op, sessions) {
            warn_log!(SOURCE, error = %err, "cannot restore bfd sessions");
        }
    }

    fn readd_sessions(&mut self, op: Operation, sessions: Vec<(SwIfIndex, BfdSession)>) -> ConfigResult<()> {
        let mut first_error = None;
        for (_, session) in sessions {
            if let Err(err) = self.add_session(op, &session) {
                self.sessions.unregister(&session.interface);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn configure_echo(&mut self, echo: &BfdEchoFunction) -> ConfigResult<ConfigureOutcome> {
        let op = Operation::Configure;
        let source = echo.echo_source_interface.as_str();
        if source.is_empty() {
            return Err(ConfigError::validation(op, &echo.name, "echo source interface is empty"));
        }
        let sw_if_index = self.interfaces.handle_of(source).ok_or_else(|| {
            ConfigError::validation(op, &echo.name, format!("echo source interface {} is not registered", source))
        })?;
        self.dataplane
            .add_bfd_echo_function(sw_if_index)
            .context(op, &echo.name, "add_bfd_echo_function")?;
        self.echo.register(echo.name.clone(), sw_if_index, echo.clone());
        info_log!(SOURCE, echo = %echo.name, interface = source, "bfd echo function set");
        Ok(ConfigureOutcome::Configured { handle: sw_if_index })
    }

    /// The dataplane has no echo modify. The change is logged and ignored.
    pub fn modify_echo(&mut self, old: &BfdEchoFunction, new: &BfdEchoFunction) -> ConfigResult<()> {
        warn_log!(SOURCE, old = %old.echo_source_interface, new = %new.echo_source_interface, "bfd echo function modify is not supported");
        Ok(())
    }

    pub fn delete_echo(&mut self, echo: &BfdEchoFunction) -> ConfigResult<()> {
        self.dataplane
            .delete_bfd_echo_function()
            .context(Operation::Delete, &echo.name, "delete_bfd_echo_function")?;
        self.echo.unregister(&echo.name);
        Ok(())
    }

    /// Reconciles authentication keys. Dumped keys are matched by id, and a
    /// key is set again only when its type differs. Obsolete keys are removed
    /// together with any dumped session that still uses them.
    pub fn resync_keys(&mut self, desired: &[BfdAuthKey]) -> ResyncOutcome {
        let op = Operation::Resync;
        let mut outcome = ResyncOutcome::default();
        self.keys.clear();

        let Some(dumped) = outcome.record(
            self.dataplane
                .dump_bfd_auth_keys()
                .context(op, "bfd-auth-keys", "dump_bfd_auth_keys"),
        ) else {
            return outcome;
        };

        let mut sessions: Option<Vec<BfdUdpSession>> = None;
        for key in &dumped {
            match desired.iter().find(|d| d.id == key.id) {
                Some(wanted) if wanted.authentication_type == key.authentication_type => {
                    self.keys.register(wanted.name.clone(), wanted.id, wanted.clone());
                    outcome.counts.registered += 1;
                }
                Some(wanted) => {
                    let set = self
                        .dataplane
                        .set_bfd_udp_auth_key(wanted)
                        .context(op, &wanted.name, "set_bfd_udp_auth_key");
                    if outcome.record(set).is_some() {
                        self.keys.register(wanted.name.clone(), wanted.id, wanted.clone());
                        outcome.counts.modified += 1;
                    }
                }
                None => {
                    if sessions.is_none() {
                        sessions = outcome.record(
                            self.dataplane
                                .dump_bfd_sessions()
                                .context(op, "bfd-sessions", "dump_bfd_sessions"),
                        );
                    }
                    let resource = format!("bfd-auth-key-{}", key.id);
                    for session in sessions.iter().flatten() {
                        if session.authentication.map(|auth| auth.key_id) != Some(key.id) {
                            continue;
                        }
                        let removed = self
                            .dataplane
                            .delete_bfd_udp_session(
                                session.sw_if_index,
                                &session.source_address,
                                &session.destination_address,
                            )
                            .context(op, &resource, "delete_bfd_udp_session");
                        outcome.record(removed);
                    }
                    let removed = self
                        .dataplane
                        .delete_bfd_udp_auth_key(key)
                        .context(op, &resource, "delete_bfd_udp_auth_key");
                    if outcome.record(removed).is_some() {
                        outcome.counts.deleted += 1;
                    }
                }
            }
        }

        for key in desired.iter().filter(|d| !dumped.iter().any(|k| k.id == d.id)) {
            if outcome.record(self.configure_key(key)).is_some() {
                outcome.counts.configured += 1;
            }
        }
        outcome
    }

    /// Reconciles sessions. A dumped session matches a desired one on
    /// interface, source and destination. Timers are modified in place, a
    /// different authentication re-adds the session. Disabled sessions count
    /// as not desired.
    pub fn resync_sessions(&mut self, desired: &[BfdSession]) -> ResyncOutcome {
        let op = Operation::Resync;
        let mut outcome = ResyncOutcome::default();
        self.sessions.clear();
        let desired: Vec<BfdSession> = desired.iter().filter(|s| s.enabled).cloned().collect();

        let Some(dumped) = outcome.record(
            self.dataplane
                .dump_bfd_sessions()
                .context(op, "bfd-sessions", "dump_bfd_sessions"),
        ) else {
            return outcome;
        };

        let mut matched = vec![false; desired.len()];
        for actual in &dumped {
            let interface = self.interfaces.name_of(actual.sw_if_index);
            let position = (0..desired.len()).find(|i| {
                let wanted = &desired[*i];
                !matched[*i]
                    && interface.as_deref() == Some(wanted.interface.as_str())
                    && endpoints(op, wanted).ok()
                        == Some((actual.source_address, actual.destination_address))
            });

            let Some(i) = position else {
                let resource = interface.unwrap_or_else(|| actual.sw_if_index.to_string());
                let removed = self
                    .dataplane
                    .delete_bfd_udp_session(actual.sw_if_index, &actual.source_address, &actual.destination_address)
                    .context(op, &resource, "delete_bfd_udp_session");
                if outcome.record(removed).is_some() {
                    outcome.counts.deleted += 1;
                }
                continue;
            };
            matched[i] = true;
            let wanted = &desired[i];

            let Some(request) = outcome.record(self.session_context(op, wanted)) else {
                continue;
            };
            if request == *actual {
                self.sessions
                    .register(wanted.interface.clone(), actual.sw_if_index, wanted.clone());
                outcome.counts.registered += 1;
                continue;
            }

            let applied = if request.authentication != actual.authentication {
                self.dataplane
                    .delete_bfd_udp_session(actual.sw_if_index, &actual.source_address, &actual.destination_address)
                    .and_then(|_| self.dataplane.add_bfd_udp_session(&request))
                    .context(op, &wanted.interface, "add_bfd_udp_session")
            } else {
                self.dataplane
                    .modify_bfd_udp_session(&request)
                    .context(op, &wanted.interface, "modify_bfd_udp_session")
            };
            if outcome.record(applied).is_some() {
                self.sessions
                    .register(wanted.interface.clone(), actual.sw_if_index, wanted.clone());
                outcome.counts.modified += 1;
            }
        }

        for (session, _) in desired.iter().zip(&matched).filter(|(_, matched)| !**matched) {
            if outcome.record(self.configure_session(session)).is_some() {
                outcome.counts.configured += 1;
            }
        }
        outcome
    }

    /// Reconciles the echo function. Only the first desired config is
    /// applied.
    pub fn resync_echo(&mut self, desired: &[BfdEchoFunction]) -> ResyncOutcome {
        let op = Operation::Resync;
        let mut outcome = ResyncOutcome::default();
        self.echo.clear();
        if desired.len() > 1 {
            warn_log!(SOURCE, count = desired.len(), "more than one bfd echo function, only the first is applied");
        }

        let Some(current) = outcome.record(
            self.dataplane
                .get_bfd_echo_source()
                .context(op, "bfd-echo-function", "get_bfd_echo_source"),
        ) else {
            return outcome;
        };

        match (desired.first(), current) {
            (Some(echo), Some(sw_if_index))
                if self.interfaces.handle_of(&echo.echo_source_interface) == Some(sw_if_index) =>
            {
                self.echo.register(echo.name.clone(), sw_if_index, echo.clone());
                outcome.counts.registered += 1;
            }
            (Some(echo), current) => {
                if outcome.record(self.configure_echo(echo)).is_some() {
                    if current.is_some() {
                        outcome.counts.modified += 1;
                    } else {
                        outcome.counts.configured += 1;
                    }
                }
            }
            (None, Some(_)) => {
                let removed = self
                    .dataplane
                    .delete_bfd_echo_function()
                    .context(op, "bfd-echo-function", "delete_bfd_echo_function");
                if outcome.record(removed).is_some() {
                    outcome.counts.deleted += 1;
                }
            }
            (None, None) => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vpp_dataplane::model::{BfdAuthentication, Interface, InterfaceLink};
    use vpp_dataplane::{InMemoryDataplane, InterfaceApi};

    fn setup() -> (BfdConfigurator, Arc<InMemoryDataplane>, SwIfIndex) {
        let dataplane = Arc::new(InMemoryDataplane::new());
        let registry = Arc::new(InterfaceRegistry::new("interfaces"));
        let idx = dataplane.add_loopback_interface("loop1").unwrap();
        let mut iface = Interface::new("loop1", InterfaceLink::Loopback);
        iface.ip_addresses = vec!["10.0.0.1/24".to_string()];
        registry.register("loop1", idx, iface);
        dataplane.clear_calls();
        (BfdConfigurator::new(dataplane.clone(), registry), dataplane, idx)
    }

    fn session(source: &str) -> BfdSession {
        BfdSession {
            interface: "loop1".to_string(),
            source_address: source.to_string(),
            destination_address: "10.0.0.2".to_string(),
            enabled: true,
            desired_min_tx_interval: 100_000,
            required_min_rx_interval: 100_000,
            detect_multiplier: 3,
            authentication: None,
        }
    }

    fn key(id: u32) -> BfdAuthKey {
        BfdAuthKey {
            name: format!("key{}", id),
            id,
            authentication_type: Default::default(),
            secret: "s3cr3t".to_string(),
        }
    }

    #[test]
    fn test_session_source_must_be_interface_address() {
        let (mut configurator, dataplane, _) = setup();
        let err = configurator.configure_session(&session("10.0.0.9")).unwrap_err();
        assert!(err.is_validation());
        assert!(dataplane.calls().is_empty());

        let handle = configurator.configure_session(&session("10.0.0.1")).unwrap().handle();
        assert!(configurator.sessions().contains("loop1"));
        assert_eq!(dataplane.bfd_sessions()[0].sw_if_index, handle);
    }

    #[test]
    fn test_unknown_key_gives_unauthenticated_session() {
        let (mut configurator, dataplane, _) = setup();
        let mut s = session("10.0.0.1");
        s.authentication = Some(BfdAuthentication {
            key_id: 7,
            advertised_key_id: 1,
        });
        configurator.configure_session(&s).unwrap();
        assert_eq!(dataplane.bfd_sessions()[0].authentication, None);
    }

    #[test]
    fn test_modify_rejects_address_change() {
        let (mut configurator, _, _) = setup();
        let old = session("10.0.0.1");
        configurator.configure_session(&old).unwrap();
        let mut new = old.clone();
        new.destination_address = "10.0.0.3".to_string();
        assert!(configurator.modify_session(&old, &new).unwrap_err().is_validation());
    }

    #[test]
    fn test_modify_timers_in_place() {
        let (mut configurator, dataplane, _) = setup();
        let old = session("10.0.0.1");
        configurator.configure_session(&old).unwrap();
        dataplane.clear_calls();

        let mut new = old.clone();
        new.detect_multiplier = 5;
        configurator.modify_session(&old, &new).unwrap();
        assert_eq!(dataplane.call_names(), vec!["modify_bfd_udp_session"]);
        assert_eq!(dataplane.bfd_sessions()[0].detect_multiplier, 5);
    }

    #[test]
    fn test_modify_missing_session_configures() {
        let (mut configurator, dataplane, _) = setup();
        let s = session("10.0.0.1");
        configurator.modify_session(&s, &s).unwrap();
        assert_eq!(dataplane.call_names(), vec!["add_bfd_udp_session"]);
    }

    #[test]
    fn test_key_delete_readds_sessions_unauthenticated() {
        let (mut configurator, dataplane, _) = setup();
        configurator.configure_key(&key(1)).unwrap();
        let mut s = session("10.0.0.1");
        s.authentication = Some(BfdAuthentication {
            key_id: 1,
            advertised_key_id: 1,
        });
        configurator.configure_session(&s).unwrap();
        dataplane.clear_calls();

        configurator.delete_key(&key(1)).unwrap();
        assert_eq!(
            dataplane.call_names(),
            vec!["delete_bfd_udp_session", "delete_bfd_udp_auth_key", "add_bfd_udp_session"]
        );
        assert_eq!(dataplane.bfd_sessions()[0].authentication, None);
        assert!(configurator.sessions().contains("loop1"));
    }

    #[test]
    fn test_key_modify_keeps_sessions() {
        let (mut configurator, dataplane, _) = setup();
        configurator.configure_key(&key(1)).unwrap();
        let mut s = session("10.0.0.1");
        s.authentication = Some(BfdAuthentication {
            key_id: 1,
            advertised_key_id: 1,
        });
        configurator.configure_session(&s).unwrap();

        let mut new_key = key(1);
        new_key.secret = "other".to_string();
        configurator.modify_key(&key(1), &new_key).unwrap();
        assert_eq!(dataplane.bfd_sessions()[0].authentication.unwrap().key_id, 1);
    }

    #[test]
    fn test_failed_key_delete_restores_sessions() {
        let (mut configurator, dataplane, _) = setup();
        configurator.configure_key(&key(1)).unwrap();
        let mut s = session("10.0.0.1");
        s.authentication = Some(BfdAuthentication {
            key_id: 1,
            advertised_key_id: 1,
        });
        configurator.configure_session(&s).unwrap();
        dataplane.fail_call("delete_bfd_udp_auth_key");
        dataplane.clear_calls();

        let err = configurator.delete_key(&key(1)).unwrap_err();
        assert_eq!(err.call(), Some("delete_bfd_udp_auth_key"));
        assert_eq!(
            dataplane.call_names(),
            vec!["delete_bfd_udp_session", "delete_bfd_udp_auth_key", "add_bfd_udp_session"]
        );
        assert!(configurator.keys().contains("key1"));
        assert!(configurator.sessions().contains("loop1"));
        assert_eq!(dataplane.bfd_sessions().len(), 1);
        assert_eq!(dataplane.bfd_sessions()[0].authentication.unwrap().key_id, 1);

        let mut new_key = key(1);
        new_key.secret = "other".to_string();
        configurator.modify_key(&key(1), &new_key).unwrap_err();
        assert!(configurator.sessions().contains("loop1"));
        assert_eq!(dataplane.bfd_sessions().len(), 1);
    }

    #[test]
    fn test_disabled_session_is_not_added() {
        let (mut configurator, dataplane, _) = setup();
        let mut disabled = session("10.0.0.1");
        disabled.enabled = false;

        let outcome = configurator.configure_session(&disabled).unwrap();
        assert_eq!(outcome, ConfigureOutcome::Skipped);
        assert!(dataplane.calls().is_empty());
        assert!(!configurator.sessions().contains("loop1"));

        let enabled = session("10.0.0.1");
        configurator.modify_session(&disabled, &enabled).unwrap();
        assert_eq!(dataplane.bfd_sessions().len(), 1);

        configurator.modify_session(&enabled, &disabled).unwrap();
        assert!(dataplane.bfd_sessions().is_empty());
        assert!(!configurator.sessions().contains("loop1"));

        configurator.configure_session(&enabled).unwrap();
        let outcome = configurator.resync_sessions(&[disabled]);
        assert_eq!(outcome.counts.deleted, 1);
        assert!(dataplane.bfd_sessions().is_empty());
    }

    #[test]
    fn test_echo() {
        let (mut configurator, dataplane, idx) = setup();
        let echo = BfdEchoFunction {
            name: "echo".to_string(),
            echo_source_interface: "loop1".to_string(),
        };
        configurator.configure_echo(&echo).unwrap();
        assert_eq!(dataplane.get_bfd_echo_source().unwrap(), Some(idx));

        dataplane.clear_calls();
        configurator.modify_echo(&echo, &echo).unwrap();
        assert!(dataplane.calls().is_empty());

        let missing = BfdEchoFunction {
            name: "echo2".to_string(),
            echo_source_interface: "nope".to_string(),
        };
        assert!(configurator.configure_echo(&missing).is_err());
    }

    #[test]
    fn test_resync_sessions() {
        let (mut configurator, dataplane, idx) = setup();
        let wanted = session("10.0.0.1");
        dataplane.seed_bfd_session(BfdUdpSession {
            sw_if_index: idx,
            source_address: "10.0.0.1".parse().unwrap(),
            destination_address: "10.0.0.2".parse().unwrap(),
            desired_min_tx_interval: 100_000,
            required_min_rx_interval: 100_000,
            detect_multiplier: 1,
            authentication: None,
        });
        dataplane.seed_bfd_session(BfdUdpSession {
            sw_if_index: idx,
            source_address: "10.0.0.1".parse().unwrap(),
            destination_address: "10.0.0.99".parse().unwrap(),
            desired_min_tx_interval: 1,
            required_min_rx_interval: 1,
            detect_multiplier: 1,
            authentication: None,
        });

        let outcome = configurator.resync_sessions(&[wanted.clone()]);
        assert!(outcome.is_clean());
        assert_eq!(outcome.counts.modified, 1);
        assert_eq!(outcome.counts.deleted, 1);

        dataplane.clear_calls();
        let outcome = configurator.resync_sessions(&[wanted]);
        assert_eq!(outcome.counts.registered, 1);
        assert!(dataplane.mutating_calls().is_empty());
    }

    #[test]
    fn test_resync_keys_removes_obsolete() {
        let (mut configurator, dataplane, _) = setup();
        dataplane.seed_bfd_auth_key(key(1));
        dataplane.seed_bfd_auth_key(key(2));

        let outcome = configurator.resync_keys(&[key(1), key(3)]);
        assert!(outcome.is_clean());
        assert_eq!(outcome.counts.registered, 1);
        assert_eq!(outcome.counts.deleted, 1);
        assert_eq!(outcome.counts.configured, 1);
        assert_eq!(configurator.keys().handle_of("key3"), Some(3));
    }
}
