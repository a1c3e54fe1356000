//! Audit records and logging setup.
//!
//! Every change the agent pushes into the dataplane produces an
//! [`AuditRecord`] logged on the `audit` tracing target, so the sequence of
//! creates, modifications, deletions and pending transitions can be replayed
//! from the log alone.
//!
//! ```
//! use vpp_agent::audit::{AuditCategory, AuditOutcome, AuditRecord};
//! use vpp_agent::audit_log;
//!
//! let record = AuditRecord::new(AuditCategory::ResourceCreate, "InterfaceConfigurator", "create_interface")
//!     .with_outcome(AuditOutcome::Success)
//!     .with_object_id("tap1")
//!     .with_object_type("tap");
//! audit_log!(record);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    ResourceCreate,
    ResourceModify,
    ResourceDelete,
    /// A resource moved in or out of the pending-dependency cache.
    PendingTransition,
    SystemLifecycle,
    NetworkConfig,
    DataplaneOperation,
    ErrorCondition,
    AdminAction,
    Resync,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::ResourceCreate => write!(f, "RESOURCE_CREATE"),
            AuditCategory::ResourceModify => write!(f, "RESOURCE_MODIFY"),
            AuditCategory::ResourceDelete => write!(f, "RESOURCE_DELETE"),
            AuditCategory::PendingTransition => write!(f, "PENDING_TRANSITION"),
            AuditCategory::SystemLifecycle => write!(f, "SYSTEM_LIFECYCLE"),
            AuditCategory::NetworkConfig => write!(f, "NETWORK_CONFIG"),
            AuditCategory::DataplaneOperation => write!(f, "DATAPLANE_OPERATION"),
            AuditCategory::ErrorCondition => write!(f, "ERROR_CONDITION"),
            AuditCategory::AdminAction => write!(f, "ADMIN_ACTION"),
            AuditCategory::Resync => write!(f, "RESYNC"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
    /// The change was accepted but parked until a dependency appears.
    Deferred,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Deferred => write!(f, "deferred"),
        }
    }
}

/// One structured audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Component that produced the record, e.g. `InterfaceConfigurator`.
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Ties together the records of one resync pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuditRecord {
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
            correlation_id: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attaches an error and marks the record as failed.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

#[macro_export]
macro_rules! debug_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::debug!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! info_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::info!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! warn_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::warn!(
            source = $source,
            $($arg)*
        )
    };
}

#[macro_export]
macro_rules! error_log {
    ($source:expr, $($arg:tt)*) => {
        tracing::error!(
            source = $source,
            $($arg)*
        )
    };
}

/// Logs an [`AuditRecord`] on the `audit` target.
///
/// Successes log at info, in-progress and deferred records at debug, and
/// failures at warn.
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress | $crate::audit::AuditOutcome::Deferred => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Installs a JSON `tracing` subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .init();
}

/// Installs a human-readable multi-line `tracing` subscriber.
pub fn init_logging_pretty(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_audit_record_creation() {
        let record = AuditRecord::new(
            AuditCategory::ResourceCreate,
            "InterfaceConfigurator",
            "create_interface",
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id("memif1")
        .with_object_type("memif");

        assert_eq!(record.category, AuditCategory::ResourceCreate);
        assert_eq!(record.source, "InterfaceConfigurator");
        assert_eq!(record.action, "create_interface");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id, Some("memif1".to_string()));
        assert_eq!(record.object_type, Some("memif".to_string()));
    }

    #[test]
    fn test_audit_record_with_error() {
        let record = AuditRecord::new(AuditCategory::ErrorCondition, "StnConfigurator", "add_rule")
            .with_error("add_stn_rule returned VNET_API_ERROR_INVALID_SW_IF_INDEX (-2)");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert!(record.error.as_deref().unwrap_or("").contains("add_stn_rule"));
    }

    #[test]
    fn test_audit_record_json_serialization() {
        let record = AuditRecord::new(AuditCategory::PendingTransition, "AfPacketConfigurator", "defer")
            .with_outcome(AuditOutcome::Deferred)
            .with_details(serde_json::json!({
                "host_if_name": "veth1",
            }));

        let json = record.to_json();
        assert!(json.contains("PENDING_TRANSITION"));
        assert!(json.contains("\"outcome\":\"deferred\""));
        assert!(json.contains("\"host_if_name\":\"veth1\""));
        assert!(!json.contains("correlation_id"));
    }

    #[test]
    fn test_audit_category_display() {
        assert_eq!(AuditCategory::ResourceCreate.to_string(), "RESOURCE_CREATE");
        assert_eq!(AuditCategory::DataplaneOperation.to_string(), "DATAPLANE_OPERATION");
        assert_eq!(AuditCategory::Resync.to_string(), "RESYNC");
    }

    #[test]
    fn test_audit_outcome_display() {
        assert_eq!(AuditOutcome::Success.to_string(), "success");
        assert_eq!(AuditOutcome::InProgress.to_string(), "in_progress");
        assert_eq!(AuditOutcome::Deferred.to_string(), "deferred");
    }

    #[test]
    fn test_audit_record_with_correlation_id() {
        let record = AuditRecord::new(AuditCategory::Resync, "ResyncEngine", "resync_interfaces")
            .with_correlation_id("resync-1")
            .with_outcome(AuditOutcome::InProgress);

        assert_eq!(record.correlation_id, Some("resync-1".to_string()));
    }
}
