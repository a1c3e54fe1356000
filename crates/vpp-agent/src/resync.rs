//! Resync bookkeeping shared by every configurator.
//!
//! Each configurator reconciles its own resource kind and reports a
//! [`ResyncOutcome`]. The agent runs them in dependency order and collects the
//! outcomes into a [`ResyncReport`].

use crate::warn_log;
use std::fmt;
use vpp_agent_common::{ConfigError, ConfigResult, DataplaneContext, Operation};
use vpp_dataplane::{Dataplane, InterfaceApi};

const SOURCE: &str = "Resync";

/// What a resync pass did for one resource kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncCounts {
    /// Found in the dump and already matching the desired config.
    pub registered: usize,
    /// Absent from the dump and created.
    pub configured: usize,
    /// Found in the dump and changed to match.
    pub modified: usize,
    /// Found in the dump with no desired counterpart and removed.
    pub deleted: usize,
    /// Desired but waiting for a dependency.
    pub pending: usize,
}

impl ResyncCounts {
    /// Number of resources the pass had to change.
    pub fn changes(&self) -> usize {
        self.configured + self.modified + self.deleted
    }
}

/// Counts and collected errors for one resource kind.
///
/// A failing resource does not stop the pass. Its error is recorded and the
/// next resource is processed.
#[derive(Debug, Clone, Default)]
pub struct ResyncOutcome {
    pub counts: ResyncCounts,
    pub errors: Vec<ConfigError>,
}

impl ResyncOutcome {
    /// Keeps the value of a successful step, or stores its error.
    pub fn record<T>(&mut self, result: ConfigResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                warn_log!(SOURCE, resource = %err.resource, error = %err, "resync step failed");
                self.errors.push(err);
                None
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Interface,
    BfdAuthKey,
    BfdSession,
    BfdEchoFunction,
    StnRule,
    Nat44Global,
    DNat,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Interface => "interface",
            ResourceKind::BfdAuthKey => "bfd-auth-key",
            ResourceKind::BfdSession => "bfd-session",
            ResourceKind::BfdEchoFunction => "bfd-echo-function",
            ResourceKind::StnRule => "stn-rule",
            ResourceKind::Nat44Global => "nat44-global",
            ResourceKind::DNat => "dnat",
        };
        write!(f, "{}", s)
    }
}

/// Result of a full resync.
#[derive(Debug, Clone, Default)]
pub struct ResyncReport {
    pub correlation_id: String,
    /// Set when the optimize-cold-start strategy found an empty dataplane.
    pub skipped: bool,
    pub kinds: Vec<(ResourceKind, ResyncOutcome)>,
}

impl ResyncReport {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        ResyncReport {
            correlation_id: correlation_id.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, kind: ResourceKind, outcome: ResyncOutcome) {
        self.kinds.push((kind, outcome));
    }

    pub fn outcome(&self, kind: ResourceKind) -> Option<&ResyncOutcome> {
        self.kinds
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }

    pub fn is_clean(&self) -> bool {
        self.kinds.iter().all(|(_, outcome)| outcome.is_clean())
    }

    pub fn errors(&self) -> impl Iterator<Item = &ConfigError> {
        self.kinds.iter().flat_map(|(_, outcome)| outcome.errors.iter())
    }

    /// Sum of the counts over every kind.
    pub fn totals(&self) -> ResyncCounts {
        self.kinds
            .iter()
            .fold(ResyncCounts::default(), |mut total, (_, outcome)| {
                total.registered += outcome.counts.registered;
                total.configured += outcome.counts.configured;
                total.modified += outcome.counts.modified;
                total.deleted += outcome.counts.deleted;
                total.pending += outcome.counts.pending;
                total
            })
    }
}

/// True when the dataplane holds any interface besides `local0`.
pub fn verify_config_presence(dataplane: &dyn Dataplane) -> ConfigResult<bool> {
    let interfaces = dataplane
        .dump_interfaces()
        .context(Operation::Resync, "interfaces", "dump_interfaces")?;
    Ok(interfaces.keys().any(|sw_if_index| *sw_if_index != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vpp_dataplane::InMemoryDataplane;

    #[test]
    fn test_record_collects_errors() {
        let mut outcome = ResyncOutcome::default();
        assert_eq!(outcome.record::<u32>(Ok(7)), Some(7));
        let failed: ConfigResult<u32> =
            Err(ConfigError::validation(Operation::Resync, "loop1", "bad"));
        assert_eq!(outcome.record(failed), None);
        assert_eq!(outcome.errors.len(), 1);
        assert!(!outcome.is_clean());
    }

    #[test]
    fn test_report_totals() {
        let mut report = ResyncReport::new("resync-1");
        let mut interfaces = ResyncOutcome::default();
        interfaces.counts.configured = 2;
        interfaces.counts.deleted = 1;
        let mut stn = ResyncOutcome::default();
        stn.counts.registered = 3;
        report.push(ResourceKind::Interface, interfaces);
        report.push(ResourceKind::StnRule, stn);

        let totals = report.totals();
        assert_eq!(totals.configured, 2);
        assert_eq!(totals.registered, 3);
        assert_eq!(totals.changes(), 3);
        assert!(report.is_clean());
        assert_eq!(report.outcome(ResourceKind::StnRule).unwrap().counts.registered, 3);
        assert!(report.outcome(ResourceKind::DNat).is_none());
    }

    #[test]
    fn test_verify_config_presence() {
        let dataplane = InMemoryDataplane::new();
        assert!(!verify_config_presence(&dataplane).unwrap());
        dataplane.add_physical_interface("GigabitEthernet0/8/0", None);
        assert!(verify_config_presence(&dataplane).unwrap());
    }
}
