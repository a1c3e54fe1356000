//! DNAT mapping identifiers, dataplane requests and dump matching.

use crate::warn_log;
use vpp_agent_common::{ConfigError, ConfigResult, Operation, ParseContext};
use vpp_dataplane::model::{AddressPool, IdentityMapping, StaticMapping, TwiceNatMode};
use vpp_dataplane::types::{
    AddressPoolContext, IdentityMappingContext, LocalIpContext, StaticMappingContext,
    StaticMappingLbContext,
};
use vpp_dataplane::{SwIfIndex, NO_INTERFACE};
use vpp_types::{strip_mask, Ipv4Address};

const SOURCE: &str = "NatConfigurator";

/// Identifier of a static mapping:
/// `{external-ip|interface}:{external-port}/{protocol}-{local-ip}-vrf{vrf}`.
///
/// The local part is taken from the first local IP.
pub fn static_mapping_identifier(mapping: &StaticMapping) -> String {
    let external = match mapping.external_interface.as_deref() {
        Some(interface) if !interface.is_empty() => interface,
        _ => strip_mask(&mapping.external_ip),
    };
    let (local_ip, vrf) = mapping
        .local_ips
        .first()
        .map(|local| (strip_mask(&local.local_ip), local.vrf_id))
        .unwrap_or(("-", 0));
    format!(
        "{}:{}/{}-{}-vrf{}",
        external, mapping.external_port, mapping.protocol, local_ip, vrf
    )
}

/// Identifier of an identity mapping: `{ip|-}-{interface|noif}-vrf{vrf}`.
pub fn identity_mapping_identifier(mapping: &IdentityMapping) -> String {
    let ip = match strip_mask(&mapping.ip_address) {
        "" => "-",
        ip => ip,
    };
    let interface = match mapping.addressed_interface.as_deref() {
        Some(interface) if !interface.is_empty() => interface,
        _ => "noif",
    };
    format!("{}-{}-vrf{}", ip, interface, mapping.vrf_id)
}

fn parse_ipv4(operation: Operation, resource: &str, address: &str) -> ConfigResult<Ipv4Address> {
    strip_mask(address)
        .parse::<Ipv4Address>()
        .parse_context(operation, resource)
}

/// Pool request with a missing bound filled from the other one.
pub(crate) fn pool_context(operation: Operation, pool: &AddressPool) -> ConfigResult<AddressPoolContext> {
    let pool = pool.normalized();
    if pool.first_src_address.is_empty() {
        return Err(ConfigError::validation(operation, "nat44-global", "address pool has no address"));
    }
    Ok(AddressPoolContext {
        first_address: parse_ipv4(operation, "nat44-global", &pool.first_src_address)?,
        last_address: parse_ipv4(operation, "nat44-global", &pool.last_src_address)?,
        vrf_id: pool.vrf_id,
        twice_nat: pool.twice_nat,
    })
}

/// A static mapping as sent to the dataplane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StaticRequest {
    Single(StaticMappingContext),
    LoadBalanced(StaticMappingLbContext),
}

fn twice_nat_flags(mode: TwiceNatMode) -> (bool, bool) {
    match mode {
        TwiceNatMode::Disabled => (false, false),
        TwiceNatMode::Enabled => (true, false),
        TwiceNatMode::SelfTwiceNat => (false, true),
    }
}

/// Builds the request for one static mapping of DNAT `label`.
///
/// `external_sw_if_index` is the resolved external interface, or
/// [`NO_INTERFACE`]. With an interface the external IP is ignored.
pub(crate) fn static_request(
    operation: Operation,
    label: &str,
    mapping: &StaticMapping,
    external_sw_if_index: SwIfIndex,
) -> ConfigResult<StaticRequest> {
    if mapping.local_ips.is_empty() {
        return Err(ConfigError::validation(operation, label, "static mapping has no local IP"));
    }
    let external_ip = if external_sw_if_index == NO_INTERFACE {
        parse_ipv4(operation, label, &mapping.external_ip)?
    } else {
        Ipv4Address::UNSPECIFIED
    };
    let (twice_nat, self_twice_nat) = twice_nat_flags(mapping.twice_nat);

    if let [local] = mapping.local_ips.as_slice() {
        return Ok(StaticRequest::Single(StaticMappingContext {
            tag: label.to_string(),
            address_only: mapping.external_port == 0 || local.local_port == 0,
            local_ip: parse_ipv4(operation, label, &local.local_ip)?,
            local_port: local.local_port,
            external_ip,
            external_port: mapping.external_port,
            external_sw_if_index,
            protocol: mapping.protocol,
            vrf_id: local.vrf_id,
            twice_nat,
            self_twice_nat,
        }));
    }

    if mapping.external_port == 0 {
        return Err(ConfigError::validation(
            operation,
            label,
            "load-balanced static mapping requires an external port",
        ));
    }
    let local_ips: Vec<LocalIpContext> = mapping
        .local_ips
        .iter()
        .filter_map(|local| {
            if local.local_port == 0 {
                warn_log!(SOURCE, label, local_ip = %local.local_ip, "local IP without port skipped");
                return None;
            }
            match strip_mask(&local.local_ip).parse::<Ipv4Address>() {
                Ok(local_ip) => Some(LocalIpContext {
                    local_ip,
                    local_port: local.local_port,
                    probability: local.probability,
                    vrf_id: local.vrf_id,
                }),
                Err(err) => {
                    warn_log!(SOURCE, label, local_ip = %local.local_ip, error = %err, "invalid local IP skipped");
                    None
                }
            }
        })
        .collect();
    if local_ips.is_empty() {
        return Err(ConfigError::validation(
            operation,
            label,
            "load-balanced static mapping has no valid local IP",
        ));
    }

    Ok(StaticRequest::LoadBalanced(StaticMappingLbContext {
        tag: label.to_string(),
        external_ip,
        external_port: mapping.external_port,
        protocol: mapping.protocol,
        local_ips,
        twice_nat,
        self_twice_nat,
    }))
}

/// Builds the request for one identity mapping. `sw_if_index` is the
/// resolved addressed interface, or [`NO_INTERFACE`].
pub(crate) fn identity_request(
    operation: Operation,
    label: &str,
    mapping: &IdentityMapping,
    sw_if_index: SwIfIndex,
) -> ConfigResult<IdentityMappingContext> {
    let ip_address = match mapping.ip_address.as_str() {
        "" if sw_if_index == NO_INTERFACE => {
            return Err(ConfigError::validation(
                operation,
                label,
                "identity mapping requires an IP address or an interface",
            ));
        }
        "" => Ipv4Address::UNSPECIFIED,
        ip => parse_ipv4(operation, label, ip)?,
    };
    Ok(IdentityMappingContext {
        tag: label.to_string(),
        address_only: mapping.port == 0,
        ip_address,
        port: mapping.port,
        protocol: mapping.protocol,
        sw_if_index,
        vrf_id: mapping.vrf_id,
    })
}

/// A mapping read from the dataplane during resync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DumpedMapping {
    Static(StaticRequest),
    Identity(IdentityMappingContext),
}

impl DumpedMapping {
    pub(crate) fn tag(&self) -> &str {
        match self {
            DumpedMapping::Static(StaticRequest::Single(ctx)) => &ctx.tag,
            DumpedMapping::Static(StaticRequest::LoadBalanced(ctx)) => &ctx.tag,
            DumpedMapping::Identity(ctx) => &ctx.tag,
        }
    }
}

fn sorted_locals(locals: &[LocalIpContext]) -> Vec<(u32, Ipv4Address, u16, u8)> {
    let mut sorted: Vec<_> = locals
        .iter()
        .map(|l| (l.vrf_id, l.local_ip, l.local_port, l.probability))
        .collect();
    sorted.sort_unstable();
    sorted
}

/// Whether a dumped mapping is the dataplane form of `wanted`.
///
/// Every discriminating field must be equal. Local endpoints of a
/// load-balanced mapping are compared as a set. The external IP of a mapping
/// bound to an external interface is not compared.
pub(crate) fn mapping_matches(dumped: &DumpedMapping, wanted: &DumpedMapping) -> bool {
    match (dumped, wanted) {
        (DumpedMapping::Static(StaticRequest::Single(d)), DumpedMapping::Static(StaticRequest::Single(w))) => {
            d.tag == w.tag
                && d.address_only == w.address_only
                && d.local_ip == w.local_ip
                && d.local_port == w.local_port
                && d.external_sw_if_index == w.external_sw_if_index
                && (w.external_sw_if_index != NO_INTERFACE || d.external_ip == w.external_ip)
                && d.external_port == w.external_port
                && d.protocol == w.protocol
                && d.vrf_id == w.vrf_id
                && d.twice_nat == w.twice_nat
                && d.self_twice_nat == w.self_twice_nat
        }
        (
            DumpedMapping::Static(StaticRequest::LoadBalanced(d)),
            DumpedMapping::Static(StaticRequest::LoadBalanced(w)),
        ) => {
            d.tag == w.tag
                && d.external_ip == w.external_ip
                && d.external_port == w.external_port
                && d.protocol == w.protocol
                && d.twice_nat == w.twice_nat
                && d.self_twice_nat == w.self_twice_nat
                && sorted_locals(&d.local_ips) == sorted_locals(&w.local_ips)
        }
        (DumpedMapping::Identity(d), DumpedMapping::Identity(w)) => d == w,
        _ => false,
    }
}

/// Removes the first dumped mapping matching `wanted` from `remaining`.
/// Returns false when there is none.
pub(crate) fn take_match(remaining: &mut Vec<DumpedMapping>, wanted: &DumpedMapping) -> bool {
    match remaining.iter().position(|dumped| mapping_matches(dumped, wanted)) {
        Some(position) => {
            remaining.remove(position);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vpp_dataplane::model::{LocalIp, Protocol};

    fn local(ip: &str, port: u16, probability: u8) -> LocalIp {
        LocalIp {
            vrf_id: 0,
            local_ip: ip.to_string(),
            local_port: port,
            probability,
        }
    }

    fn mapping(external_ip: &str, locals: Vec<LocalIp>) -> StaticMapping {
        StaticMapping {
            external_ip: external_ip.to_string(),
            external_port: 80,
            local_ips: locals,
            protocol: Protocol::Tcp,
            ..Default::default()
        }
    }

    #[test]
    fn test_static_identifier() {
        let m = mapping("10.0.0.1", vec![local("192.168.0.1", 8080, 0)]);
        assert_eq!(static_mapping_identifier(&m), "10.0.0.1:80/tcp-192.168.0.1-vrf0");
        assert_eq!(static_mapping_identifier(&m), static_mapping_identifier(&m.clone()));

        let mut on_interface = m.clone();
        on_interface.external_interface = Some("eth0".to_string());
        assert_eq!(static_mapping_identifier(&on_interface), "eth0:80/tcp-192.168.0.1-vrf0");
    }

    #[test]
    fn test_identity_identifier() {
        let m = IdentityMapping {
            ip_address: "10.0.0.5".to_string(),
            vrf_id: 2,
            ..Default::default()
        };
        assert_eq!(identity_mapping_identifier(&m), "10.0.0.5-noif-vrf2");

        let m = IdentityMapping {
            addressed_interface: Some("eth0".to_string()),
            ..Default::default()
        };
        assert_eq!(identity_mapping_identifier(&m), "--eth0-vrf0");
    }

    #[test]
    fn test_single_mapping_address_only() {
        let mut m = mapping("10.0.0.1", vec![local("192.168.0.1", 0, 0)]);
        m.external_port = 0;
        match static_request(Operation::Configure, "web", &m, NO_INTERFACE).unwrap() {
            StaticRequest::Single(ctx) => {
                assert!(ctx.address_only);
                assert_eq!(ctx.tag, "web");
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_no_local_ip_is_invalid() {
        let m = mapping("10.0.0.1", vec![]);
        let err = static_request(Operation::Configure, "web", &m, NO_INTERFACE).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_load_balanced_skips_bad_locals() {
        let m = mapping(
            "10.0.0.1",
            vec![local("192.168.0.1", 8080, 50), local("192.168.0.2", 0, 50), local("bad", 80, 1)],
        );
        match static_request(Operation::Configure, "web", &m, NO_INTERFACE).unwrap() {
            StaticRequest::LoadBalanced(ctx) => assert_eq!(ctx.local_ips.len(), 1),
            other => panic!("unexpected request {:?}", other),
        }

        let m = mapping("10.0.0.1", vec![local("192.168.0.2", 0, 50), local("bad", 80, 1)]);
        assert!(static_request(Operation::Configure, "web", &m, NO_INTERFACE).is_err());

        let mut m = mapping("10.0.0.1", vec![local("192.168.0.1", 80, 50), local("192.168.0.2", 80, 50)]);
        m.external_port = 0;
        assert!(static_request(Operation::Configure, "web", &m, NO_INTERFACE).is_err());
    }

    #[test]
    fn test_identity_requires_ip_or_interface() {
        let m = IdentityMapping::default();
        assert!(identity_request(Operation::Configure, "web", &m, NO_INTERFACE).is_err());
        let ctx = identity_request(Operation::Configure, "web", &m, 3).unwrap();
        assert_eq!(ctx.ip_address, Ipv4Address::UNSPECIFIED);
        assert_eq!(ctx.sw_if_index, 3);
    }

    #[test]
    fn test_load_balanced_match_ignores_order() {
        let a = mapping("10.0.0.1", vec![local("192.168.0.1", 80, 30), local("192.168.0.2", 80, 70)]);
        let b = mapping("10.0.0.1", vec![local("192.168.0.2", 80, 70), local("192.168.0.1", 80, 30)]);
        let a = DumpedMapping::Static(static_request(Operation::Resync, "web", &a, NO_INTERFACE).unwrap());
        let b = DumpedMapping::Static(static_request(Operation::Resync, "web", &b, NO_INTERFACE).unwrap());
        assert!(mapping_matches(&a, &b));
    }

    #[test]
    fn test_take_match_first_wins_once() {
        let m = mapping("10.0.0.1", vec![local("192.168.0.1", 8080, 0)]);
        let wanted = DumpedMapping::Static(static_request(Operation::Resync, "web", &m, NO_INTERFACE).unwrap());
        let mut remaining = vec![wanted.clone(), wanted.clone()];

        assert!(take_match(&mut remaining, &wanted));
        assert_eq!(remaining.len(), 1);
        assert!(take_match(&mut remaining, &wanted));
        assert!(!take_match(&mut remaining, &wanted));
    }
}
