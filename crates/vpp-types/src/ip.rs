//! IP addresses and interface address prefixes.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 address, as NAT44 requests carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv4Address(Ipv4Addr);

impl Ipv4Address {
    /// `0.0.0.0`, the "no address" value of the NAT API.
    pub const UNSPECIFIED: Self = Ipv4Address(Ipv4Addr::UNSPECIFIED);

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address(Ipv4Addr::new(a, b, c, d))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Address(addr)
    }
}

/// An IPv6 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv6Address(Ipv6Addr);

impl From<Ipv6Addr> for Ipv6Address {
    fn from(addr: Ipv6Addr) -> Self {
        Ipv6Address(addr)
    }
}

macro_rules! address_text {
    ($wrapper:ident, $std:ty) => {
        impl fmt::Display for $wrapper {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $wrapper {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<$std>()
                    .map($wrapper)
                    .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
            }
        }
    };
}

address_text!(Ipv4Address, Ipv4Addr);
address_text!(Ipv6Address, Ipv6Addr);

/// Either address family. Dumps report addresses in this form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpAddress {
    V4(Ipv4Address),
    V6(Ipv6Address),
}

impl IpAddress {
    pub const fn is_ipv4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    /// A VXLAN tunnel takes its destination from the first such address of
    /// its multicast interface.
    pub fn is_multicast(&self) -> bool {
        match self {
            IpAddress::V4(Ipv4Address(addr)) => addr.is_multicast(),
            IpAddress::V6(Ipv6Address(addr)) => addr.is_multicast(),
        }
    }

    /// True for `fe80::/10`. The dataplane assigns these on its own when an
    /// interface gets its first IPv6 address, so they are never diffed.
    pub fn is_link_local(&self) -> bool {
        match self {
            IpAddress::V4(_) => false,
            IpAddress::V6(Ipv6Address(addr)) => addr.segments()[0] & 0xffc0 == 0xfe80,
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(addr) => addr.fmt(f),
            IpAddress::V6(addr) => addr.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            s.parse().map(IpAddress::V6)
        } else {
            s.parse().map(IpAddress::V4)
        }
    }
}

impl From<Ipv4Address> for IpAddress {
    fn from(addr: Ipv4Address) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv6Address> for IpAddress {
    fn from(addr: Ipv6Address) -> Self {
        IpAddress::V6(addr)
    }
}

/// An interface address written as `address/len`.
///
/// Host bits are significant: `10.0.0.1/24` and `10.0.0.2/24` are two
/// different interface addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    address: IpAddress,
    prefix_len: u8,
}

impl IpPrefix {
    /// # Errors
    ///
    /// Fails when `prefix_len` is longer than the address (32 or 128 bits).
    pub fn new(address: IpAddress, prefix_len: u8) -> Result<Self, ParseError> {
        let bits = if address.is_ipv4() { 32 } else { 128 };
        if prefix_len > bits {
            return Err(ParseError::InvalidIpPrefix(format!("{}/{}", address, prefix_len)));
        }
        Ok(IpPrefix { address, prefix_len })
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub const fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }

    pub const fn is_ipv6(&self) -> bool {
        !self.address.is_ipv4()
    }

    pub fn is_link_local(&self) -> bool {
        self.address.is_link_local()
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidIpPrefix(s.to_string());
        let (address, len) = s.rsplit_once('/').ok_or_else(invalid)?;
        let prefix_len = len.parse::<u8>().map_err(|_| invalid())?;
        IpPrefix::new(address.parse()?, prefix_len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> String {
        prefix.to_string()
    }
}

/// Returns the address part of `addr/len`, or the input when there is no mask.
pub fn strip_mask(s: &str) -> &str {
    s.split_once('/').map_or(s, |(addr, _)| addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_link_local() {
        let link_local: IpAddress = "fe80::1".parse().unwrap();
        assert!(link_local.is_link_local());
        let global: IpAddress = "2001:db8::1".parse().unwrap();
        assert!(!global.is_link_local());
        let v4: IpAddress = "169.254.0.1".parse().unwrap();
        assert!(!v4.is_link_local());
    }

    #[test]
    fn test_multicast() {
        assert!("239.1.1.1".parse::<IpAddress>().unwrap().is_multicast());
        assert!("ff02::1".parse::<IpAddress>().unwrap().is_multicast());
        assert!(!"10.0.0.1".parse::<IpAddress>().unwrap().is_multicast());
    }

    #[test]
    fn test_prefix_mask_is_significant() {
        let prefix: IpPrefix = "10.0.0.1/24".parse().unwrap();
        assert_eq!(prefix.prefix_len(), 24);
        assert_ne!(prefix, "10.0.0.1/16".parse().unwrap());
        assert!(prefix.is_ipv4());
        assert!("2001:db8::1/64".parse::<IpPrefix>().unwrap().is_ipv6());
    }

    #[test]
    fn test_invalid_prefix() {
        assert!("10.0.0.300/24".parse::<IpPrefix>().is_err());
        assert!("10.0.0.1/x".parse::<IpPrefix>().is_err());
        assert_eq!(
            IpPrefix::new("10.0.0.1".parse().unwrap(), 40),
            Err(ParseError::InvalidIpPrefix("10.0.0.1/40".to_string()))
        );
    }

    #[test]
    fn test_prefix_serde_as_string() {
        let prefix: IpPrefix = serde_json::from_str("\"192.168.0.1/16\"").unwrap();
        assert_eq!(serde_json::to_string(&prefix).unwrap(), "\"192.168.0.1/16\"");
        assert!(serde_json::from_str::<IpPrefix>("\"192.168.0.1\"").is_err());
    }

    #[test]
    fn test_nat_unspecified() {
        assert_eq!(Ipv4Address::UNSPECIFIED.to_string(), "0.0.0.0");
        assert_eq!(Ipv4Address::new(80, 0, 0, 1), "80.0.0.1".parse().unwrap());
    }
}
