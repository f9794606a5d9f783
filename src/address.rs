// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node address resolution.
//!
//! A node reports a list of typed addresses in `status.addresses`. Controllers usually
//! need exactly one of them, chosen by a caller-supplied priority list of address
//! types. The `kubernetes.io/hostname` label overrides any `Hostname` status address,
//! which lets an operator correct a node's self-reported hostname through metadata
//! without touching its status.
//!
//! # Example
//!
//! ```rust
//! use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeStatus};
//! use nodeutil::address::{get_preferred_node_address, NodeAddressType};
//!
//! let node = Node {
//!     status: Some(NodeStatus {
//!         addresses: Some(vec![
//!             NodeAddress { type_: "InternalIP".into(), address: "10.0.0.4".into() },
//!             NodeAddress { type_: "ExternalIP".into(), address: "203.0.113.9".into() },
//!         ]),
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! };
//!
//! let address = get_preferred_node_address(
//!     &node,
//!     &[NodeAddressType::Hostname, NodeAddressType::ExternalIP],
//! )
//! .unwrap();
//! assert_eq!(address, "203.0.113.9");
//! ```

use crate::constants::{
    ADDRESS_TYPE_EXTERNAL_DNS, ADDRESS_TYPE_EXTERNAL_IP, ADDRESS_TYPE_HOSTNAME,
    ADDRESS_TYPE_INTERNAL_DNS, ADDRESS_TYPE_INTERNAL_IP, ZONE_KEY_SEPARATOR,
};
use crate::errors::NodeError;
use crate::labels::{
    LABEL_FAILURE_DOMAIN_REGION, LABEL_FAILURE_DOMAIN_ZONE, LABEL_HOSTNAME, LABEL_TOPOLOGY_REGION,
    LABEL_TOPOLOGY_ZONE,
};
use crate::metrics;
use k8s_openapi::api::core::v1::{Node, NodeAddress};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::debug;

/// The address types a node can report in `status.addresses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeAddressType {
    /// The node's hostname
    Hostname,
    /// An externally routable IP
    ExternalIP,
    /// A cluster-internal IP
    InternalIP,
    /// An externally resolvable DNS name
    ExternalDNS,
    /// A cluster-internal DNS name
    InternalDNS,
}

impl NodeAddressType {
    /// The Kubernetes API name of this address type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hostname => ADDRESS_TYPE_HOSTNAME,
            Self::ExternalIP => ADDRESS_TYPE_EXTERNAL_IP,
            Self::InternalIP => ADDRESS_TYPE_INTERNAL_IP,
            Self::ExternalDNS => ADDRESS_TYPE_EXTERNAL_DNS,
            Self::InternalDNS => ADDRESS_TYPE_INTERNAL_DNS,
        }
    }

    /// Returns true if `address` is of this type.
    #[must_use]
    pub fn matches(self, address: &NodeAddress) -> bool {
        address.type_ == self.as_str()
    }
}

impl fmt::Display for NodeAddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeAddressType {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ADDRESS_TYPE_HOSTNAME => Ok(Self::Hostname),
            ADDRESS_TYPE_EXTERNAL_IP => Ok(Self::ExternalIP),
            ADDRESS_TYPE_INTERNAL_IP => Ok(Self::InternalIP),
            ADDRESS_TYPE_EXTERNAL_DNS => Ok(Self::ExternalDNS),
            ADDRESS_TYPE_INTERNAL_DNS => Ok(Self::InternalDNS),
            other => Err(NodeError::UnknownAddressType(other.to_string())),
        }
    }
}

/// Parse a comma-separated list of address type names, keeping order.
///
/// Empty entries are skipped, so `"Hostname,,InternalIP"` is accepted.
///
/// # Errors
///
/// Returns [`NodeError::UnknownAddressType`] for the first unrecognized name.
pub fn parse_preferences(list: &str) -> Result<Vec<NodeAddressType>, NodeError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(NodeAddressType::from_str)
        .collect()
}

/// Render an address list for diagnostics.
///
/// The output is part of the error contract: `[{InternalIP 1.2.3.4} {Hostname node-a}]`,
/// in stored order, and `[]` for an empty list.
#[must_use]
pub fn format_known_addresses(addresses: &[NodeAddress]) -> String {
    let rendered: Vec<String> = addresses
        .iter()
        .map(|a| format!("{{{} {}}}", a.type_, a.address))
        .collect();
    format!("[{}]", rendered.join(" "))
}

/// Pick the preferred address from borrowed node parts.
///
/// Preferences are tried in order and the first one satisfied wins. For
/// [`NodeAddressType::Hostname`] a non-empty hostname label is consulted before
/// the status addresses; for every other type the first address of that type in stored
/// order is returned.
///
/// # Errors
///
/// Returns [`NodeError::AddressNotFound`] listing every known address when no
/// preference matches.
pub fn resolve_preferred_address(
    labels: &BTreeMap<String, String>,
    addresses: &[NodeAddress],
    preferences: &[NodeAddressType],
) -> Result<String, NodeError> {
    for preference in preferences {
        if *preference == NodeAddressType::Hostname {
            if let Some(hostname) = labels.get(LABEL_HOSTNAME).filter(|h| !h.is_empty()) {
                return Ok(hostname.clone());
            }
        }
        if let Some(found) = addresses.iter().find(|a| preference.matches(a)) {
            return Ok(found.address.clone());
        }
    }

    Err(NodeError::AddressNotFound {
        known: format_known_addresses(addresses),
    })
}

/// Pick the preferred address for a node.
///
/// See [`resolve_preferred_address`] for the selection rules.
///
/// # Errors
///
/// Returns [`NodeError::AddressNotFound`] when no preference matches.
pub fn get_preferred_node_address(
    node: &Node,
    preferences: &[NodeAddressType],
) -> Result<String, NodeError> {
    let empty_labels = BTreeMap::new();
    let labels = node.metadata.labels.as_ref().unwrap_or(&empty_labels);
    let addresses = node_addresses(node);

    let result = resolve_preferred_address(labels, addresses, preferences);
    match &result {
        Ok(address) => {
            debug!(
                node = node.metadata.name.as_deref().unwrap_or_default(),
                address = %address,
                "Resolved preferred node address"
            );
            metrics::record_address_resolution("resolved");
        }
        Err(e) => {
            debug!(
                node = node.metadata.name.as_deref().unwrap_or_default(),
                error = %e,
                "No preferred node address"
            );
            metrics::record_address_resolution("not_found");
        }
    }
    result
}

/// Return the node's primary IP: the first parseable `InternalIP`, else the first
/// parseable `ExternalIP`.
///
/// # Errors
///
/// Returns [`NodeError::HostIpUnknown`] when neither type yields a valid IP.
pub fn get_node_host_ip(node: &Node) -> Result<IpAddr, NodeError> {
    let addresses = node_addresses(node);

    [NodeAddressType::InternalIP, NodeAddressType::ExternalIP]
        .iter()
        .find_map(|preference| {
            addresses
                .iter()
                .filter(|a| preference.matches(a))
                .find_map(|a| a.address.parse::<IpAddr>().ok())
        })
        .ok_or_else(|| NodeError::HostIpUnknown {
            known: format_known_addresses(addresses),
        })
}

/// Build the zone key for a node from its topology labels.
///
/// Prefers the `topology.kubernetes.io` labels and falls back to the legacy
/// `failure-domain.beta.kubernetes.io` ones. Returns an empty string when the node
/// carries neither a region nor a zone.
#[must_use]
pub fn get_zone_key(node: &Node) -> String {
    let Some(labels) = node.metadata.labels.as_ref() else {
        return String::new();
    };

    let lookup = |primary: &str, legacy: &str| -> String {
        labels
            .get(primary)
            .or_else(|| labels.get(legacy))
            .cloned()
            .unwrap_or_default()
    };
    let region = lookup(LABEL_TOPOLOGY_REGION, LABEL_FAILURE_DOMAIN_REGION);
    let zone = lookup(LABEL_TOPOLOGY_ZONE, LABEL_FAILURE_DOMAIN_ZONE);

    if region.is_empty() && zone.is_empty() {
        return String::new();
    }
    create_zone_id(&region, &zone)
}

/// Join a region and zone into a single zone key.
#[must_use]
pub fn create_zone_id(region: &str, zone: &str) -> String {
    format!("{region}{ZONE_KEY_SEPARATOR}{zone}")
}

fn node_addresses(node: &Node) -> &[NodeAddress] {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_deref())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "address_tests.rs"]
mod address_tests;
