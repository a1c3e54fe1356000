//! Dataplane error types and return value handling.
//!
//! Every binary API reply carries a signed `retval`. This module turns those
//! raw values into Rust results so handler code can propagate failures with `?`.

use std::fmt;
use thiserror::Error;

/// Return values of VPP binary API calls.
///
/// Only the values the configurators react to are named; anything else maps to
/// [`VppRetval::Unspecified`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VppRetval {
    Ok = 0,
    Unspecified = -1,
    InvalidSwIfIndex = -2,
    NoSuchFib = -3,
    NoSuchEntry = -6,
    InvalidValue = -7,
    Unimplemented = -9,
}

impl VppRetval {
    /// Creates a VppRetval from a raw reply value.
    pub fn from_raw(retval: i32) -> Self {
        match retval {
            0 => VppRetval::Ok,
            -2 => VppRetval::InvalidSwIfIndex,
            -3 => VppRetval::NoSuchFib,
            -6 => VppRetval::NoSuchEntry,
            -7 => VppRetval::InvalidValue,
            -9 => VppRetval::Unimplemented,
            _ => VppRetval::Unspecified,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == VppRetval::Ok
    }

    /// Converts to a Result, attributing a failure to `message`.
    pub fn into_result(self, message: &str) -> DataplaneResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(DataplaneError::retval(message, self))
        }
    }
}

impl fmt::Display for VppRetval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VppRetval::Ok => "OK",
            VppRetval::Unspecified => "VNET_API_ERROR_UNSPECIFIED",
            VppRetval::InvalidSwIfIndex => "VNET_API_ERROR_INVALID_SW_IF_INDEX",
            VppRetval::NoSuchFib => "VNET_API_ERROR_NO_SUCH_FIB",
            VppRetval::NoSuchEntry => "VNET_API_ERROR_NO_SUCH_ENTRY",
            VppRetval::InvalidValue => "VNET_API_ERROR_INVALID_VALUE",
            VppRetval::Unimplemented => "VNET_API_ERROR_UNIMPLEMENTED",
        };
        write!(f, "{} ({})", s, *self as i32)
    }
}

/// Error type for dataplane handler operations.
#[derive(Debug, Clone, Error)]
pub enum DataplaneError {
    /// The dataplane replied with a non-zero retval.
    #[error("{message} returned {retval}")]
    Retval { message: String, retval: VppRetval },

    /// The request never got a reply.
    #[error("{message} failed in transport: {reason}")]
    Transport { message: String, reason: String },

    /// The handler cannot express the request.
    #[error("not supported: {feature}")]
    NotSupported { feature: String },
}

impl DataplaneError {
    pub fn retval(message: impl Into<String>, retval: VppRetval) -> Self {
        DataplaneError::Retval {
            message: message.into(),
            retval,
        }
    }

    pub fn transport(message: impl Into<String>, reason: impl Into<String>) -> Self {
        DataplaneError::Transport {
            message: message.into(),
            reason: reason.into(),
        }
    }

    pub fn not_supported(feature: impl Into<String>) -> Self {
        DataplaneError::NotSupported {
            feature: feature.into(),
        }
    }

    /// Returns the reply value if the dataplane answered at all.
    pub fn retval_code(&self) -> Option<VppRetval> {
        match self {
            DataplaneError::Retval { retval, .. } => Some(*retval),
            _ => None,
        }
    }

    /// Returns true if the object the call referred to does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.retval_code(),
            Some(VppRetval::NoSuchEntry | VppRetval::InvalidSwIfIndex)
        )
    }
}

/// Result type for dataplane operations.
pub type DataplaneResult<T> = Result<T, DataplaneError>;

/// Extension trait for checking raw reply values.
pub trait RetvalExt {
    fn check(self, message: &str) -> DataplaneResult<()>;
}

impl RetvalExt for i32 {
    fn check(self, message: &str) -> DataplaneResult<()> {
        VppRetval::from_raw(self).into_result(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_retval_from_raw() {
        assert_eq!(VppRetval::from_raw(0), VppRetval::Ok);
        assert_eq!(VppRetval::from_raw(-6), VppRetval::NoSuchEntry);
        assert_eq!(VppRetval::from_raw(-999), VppRetval::Unspecified);
    }

    #[test]
    fn test_raw_retval_check() {
        assert!(0_i32.check("sw_interface_set_flags").is_ok());

        let err = (-2_i32).check("sw_interface_set_flags").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "sw_interface_set_flags returned VNET_API_ERROR_INVALID_SW_IF_INDEX (-2)"
        );
    }

    #[test]
    fn test_transport_error_has_no_retval() {
        let err = DataplaneError::transport("tap_create_v2", "socket closed");
        assert_eq!(err.retval_code(), None);
        assert!(!err.is_not_found());
    }
}
