//! Configurator error type.

use std::fmt;
use thiserror::Error;
use vpp_dataplane::DataplaneError;
use vpp_types::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or incomplete input. Nothing was changed.
    Validation,
    /// A dataplane call failed. Earlier steps of the operation stay applied.
    Dataplane,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Configure,
    Modify,
    Delete,
    Resync,
    ResolveCreated,
    ResolveDeleted,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Configure => "configure",
            Operation::Modify => "modify",
            Operation::Delete => "delete",
            Operation::Resync => "resync",
            Operation::ResolveCreated => "resolve-created",
            Operation::ResolveDeleted => "resolve-deleted",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ErrorCause {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{call}: {source}")]
    Dataplane {
        call: String,
        #[source]
        source: DataplaneError,
    },
}

/// Error returned by every configurator operation.
///
/// Carries the resource name and the operation so a failure can be traced back
/// to the desired-state change that caused it.
#[derive(Debug, Clone, Error)]
#[error("{operation} {resource} failed: {cause}")]
pub struct ConfigError {
    pub kind: ErrorKind,
    pub resource: String,
    pub operation: Operation,
    #[source]
    pub cause: ErrorCause,
}

impl ConfigError {
    pub fn validation(operation: Operation, resource: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError {
            kind: ErrorKind::Validation,
            resource: resource.into(),
            operation,
            cause: ErrorCause::Invalid(message.into()),
        }
    }

    pub fn parse(operation: Operation, resource: impl Into<String>, err: ParseError) -> Self {
        ConfigError {
            kind: ErrorKind::Validation,
            resource: resource.into(),
            operation,
            cause: ErrorCause::Parse(err),
        }
    }

    pub fn dataplane(
        operation: Operation,
        resource: impl Into<String>,
        call: impl Into<String>,
        source: DataplaneError,
    ) -> Self {
        ConfigError {
            kind: ErrorKind::Dataplane,
            resource: resource.into(),
            operation,
            cause: ErrorCause::Dataplane {
                call: call.into(),
                source,
            },
        }
    }

    pub fn internal(operation: Operation, resource: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError {
            kind: ErrorKind::Internal,
            resource: resource.into(),
            operation,
            cause: ErrorCause::Invalid(message.into()),
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }

    pub fn is_dataplane(&self) -> bool {
        self.kind == ErrorKind::Dataplane
    }

    /// The failed dataplane call, if any.
    pub fn call(&self) -> Option<&str> {
        match &self.cause {
            ErrorCause::Dataplane { call, .. } => Some(call),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Attaches configurator context to a dataplane result.
pub trait DataplaneContext<T> {
    fn context(self, operation: Operation, resource: &str, call: &str) -> ConfigResult<T>;
}

impl<T> DataplaneContext<T> for Result<T, DataplaneError> {
    fn context(self, operation: Operation, resource: &str, call: &str) -> ConfigResult<T> {
        self.map_err(|err| ConfigError::dataplane(operation, resource, call, err))
    }
}

/// Attaches configurator context to a parse result.
pub trait ParseContext<T> {
    fn parse_context(self, operation: Operation, resource: &str) -> ConfigResult<T>;
}

impl<T> ParseContext<T> for Result<T, ParseError> {
    fn parse_context(self, operation: Operation, resource: &str) -> ConfigResult<T> {
        self.map_err(|err| ConfigError::parse(operation, resource, err))
    }
}

/// Result of a successful configure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// The resource exists in the dataplane under `handle`.
    Configured { handle: u32 },
    /// A prerequisite is missing. The resource is cached until it appears.
    Pending { dependency: String },
    /// Nothing to do (a physical interface that does not exist).
    Skipped,
}

impl ConfigureOutcome {
    /// The handle, or 0 when nothing was created.
    pub fn handle(&self) -> u32 {
        match self {
            ConfigureOutcome::Configured { handle } => *handle,
            _ => 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ConfigureOutcome::Pending { .. })
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, ConfigureOutcome::Configured { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::error::Error as _;
    use vpp_dataplane::VppRetval;

    #[test]
    fn test_dataplane_error_context() {
        let result: Result<(), DataplaneError> =
            Err(DataplaneError::retval("sw_interface_set_flags", VppRetval::InvalidSwIfIndex));
        let err = result
            .context(Operation::Configure, "tap1", "interface_admin_up")
            .unwrap_err();

        assert!(err.is_dataplane());
        assert_eq!(err.resource, "tap1");
        assert_eq!(err.call(), Some("interface_admin_up"));
        assert!(err.to_string().starts_with("configure tap1 failed: interface_admin_up"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_parse_error_is_validation() {
        let err = "300.0.0.1/24"
            .parse::<vpp_types::IpPrefix>()
            .parse_context(Operation::Modify, "loop1")
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.operation, Operation::Modify);
    }

    #[test]
    fn test_outcome_handle() {
        assert_eq!(ConfigureOutcome::Configured { handle: 3 }.handle(), 3);
        let pending = ConfigureOutcome::Pending {
            dependency: "h1".to_string(),
        };
        assert_eq!(pending.handle(), 0);
        assert!(pending.is_pending());
        assert!(!ConfigureOutcome::Skipped.is_configured());
    }
}
