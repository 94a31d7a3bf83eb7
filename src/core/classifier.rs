//! VPN membership classification.
//!
//! A device counts as tunneled when any discovered address starts with the
//! VPN prefix (the first two octets of the configured VPN network). This is a
//! string heuristic, not proof of tunnel membership: a blocked candidate
//! source gives false negatives, and nothing stops a local interface from
//! sharing the prefix.

use crate::constants::{DEFAULT_VPN_PREFIX, UNKNOWN_ADDRESS};
use crate::state::{AddressSet, VpnStatus};

/// Outcome of classifying one address set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub connected: bool,
    pub client_address: String,
}

/// Prefix for a network such as `10.8.0.0/24`: its first two octets.
///
/// Blank input falls back to `10.8`.
#[must_use]
pub fn vpn_prefix_from_network(network: &str) -> String {
    let network = network.trim();
    if network.is_empty() {
        return DEFAULT_VPN_PREFIX.to_string();
    }
    network.split('.').take(2).collect::<Vec<_>>().join(".")
}

/// Classifies `addresses` against `vpn_prefix`.
///
/// The client address is the first address inside the VPN subnet, else the
/// first address found, else `"unknown"`.
#[must_use]
pub fn classify(addresses: &AddressSet, vpn_prefix: &str) -> Classification {
    let connected = addresses.iter().any(|a| a.starts_with(vpn_prefix));

    let subnet = format!("{vpn_prefix}.");
    let client_address = addresses
        .iter()
        .find(|a| a.starts_with(&subnet))
        .or_else(|| addresses.iter().next())
        .unwrap_or(UNKNOWN_ADDRESS)
        .to_string();

    Classification {
        connected,
        client_address,
    }
}

/// Completed status snapshot for one probe cycle.
#[must_use]
pub fn to_status(addresses: AddressSet, vpn_prefix: &str) -> VpnStatus {
    let Classification {
        connected,
        client_address,
    } = classify(&addresses, vpn_prefix);

    VpnStatus {
        connected,
        client_address: Some(client_address),
        all_addresses: addresses,
        loading: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(addrs: &[&str]) -> AddressSet {
        addrs.iter().copied().collect()
    }

    #[test]
    fn test_vpn_address_detected() {
        let result = classify(&set(&["10.8.0.5", "192.168.1.2"]), "10.8");
        assert!(result.connected);
        assert_eq!(result.client_address, "10.8.0.5");
    }

    #[test]
    fn test_vpn_address_preferred_even_when_found_later() {
        let result = classify(&set(&["192.168.1.2", "10.8.0.5"]), "10.8");
        assert!(result.connected);
        assert_eq!(result.client_address, "10.8.0.5");
    }

    #[test]
    fn test_no_vpn_address_falls_back_to_first() {
        let result = classify(&set(&["192.168.1.2", "172.16.0.3"]), "10.8");
        assert!(!result.connected);
        assert_eq!(result.client_address, "192.168.1.2");
    }

    #[test]
    fn test_empty_set_is_unknown() {
        let result = classify(&AddressSet::new(), "10.8");
        assert!(!result.connected);
        assert_eq!(result.client_address, "unknown");
    }

    #[test]
    fn test_connected_iff_any_prefix_match() {
        let cases: &[(&[&str], &str, bool)] = &[
            (&["10.8.0.1"], "10.8", true),
            (&["10.80.1.1"], "10.8", true),
            (&["10.9.0.1"], "10.8", false),
            (&["192.168.5.5", "172.20.0.1"], "172.20", true),
            (&["fd00:0:0:0:0:0:0:1"], "10.8", false),
        ];
        for (addrs, prefix, expected) in cases {
            let addresses = set(addrs);
            let any_match = addresses.iter().any(|a| a.starts_with(prefix));
            let result = classify(&addresses, prefix);
            assert_eq!(result.connected, *expected, "{addrs:?} / {prefix}");
            assert_eq!(result.connected, any_match);
        }
    }

    #[test]
    fn test_prefix_from_network() {
        assert_eq!(vpn_prefix_from_network("10.8.0.0/24"), "10.8");
        assert_eq!(vpn_prefix_from_network("172.20.0.0/16"), "172.20");
        assert_eq!(vpn_prefix_from_network(""), "10.8");
        assert_eq!(vpn_prefix_from_network("  "), "10.8");
    }

    #[test]
    fn test_to_status_is_complete_snapshot() {
        let status = to_status(set(&["10.8.0.5"]), "10.8");
        assert!(!status.loading);
        assert!(status.connected);
        assert_eq!(status.client_address.as_deref(), Some("10.8.0.5"));
        assert_eq!(status.all_addresses.len(), 1);
    }
}
