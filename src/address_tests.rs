// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `address.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn addr(type_: &str, address: &str) -> NodeAddress {
        NodeAddress {
            type_: type_.to_string(),
            address: address.to_string(),
        }
    }

    fn node_with(labels: BTreeMap<String, String>, addresses: Vec<NodeAddress>) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some("node0".to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            status: Some(NodeStatus {
                addresses: Some(addresses),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn hostname_label(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(LABEL_HOSTNAME.to_string(), value.to_string())])
    }

    struct Case {
        name: &'static str,
        labels: BTreeMap<String, String>,
        addresses: Vec<NodeAddress>,
        preferences: Vec<NodeAddressType>,
        expect_err: &'static str,
        expect_address: &'static str,
    }

    #[test]
    fn test_get_preferred_address() {
        let cases = vec![
            Case {
                name: "no addresses",
                labels: BTreeMap::new(),
                addresses: vec![],
                preferences: vec![],
                expect_err: "no preferred addresses found; known addresses: []",
                expect_address: "",
            },
            Case {
                name: "missing address",
                labels: BTreeMap::new(),
                addresses: vec![addr("InternalIP", "1.2.3.4")],
                preferences: vec![NodeAddressType::Hostname],
                expect_err: "no preferred addresses found; known addresses: [{InternalIP 1.2.3.4}]",
                expect_address: "",
            },
            Case {
                name: "found address",
                labels: BTreeMap::new(),
                addresses: vec![
                    addr("InternalIP", "1.2.3.4"),
                    addr("ExternalIP", "1.2.3.5"),
                    addr("ExternalIP", "1.2.3.7"),
                ],
                preferences: vec![NodeAddressType::Hostname, NodeAddressType::ExternalIP],
                expect_err: "",
                expect_address: "1.2.3.5",
            },
            Case {
                name: "found hostname address",
                labels: BTreeMap::new(),
                addresses: vec![
                    addr("ExternalIP", "1.2.3.5"),
                    addr("Hostname", "status-hostname"),
                ],
                preferences: vec![NodeAddressType::Hostname, NodeAddressType::ExternalIP],
                expect_err: "",
                expect_address: "status-hostname",
            },
            Case {
                name: "label overrides hostname address",
                labels: hostname_label("label-hostname"),
                addresses: vec![
                    addr("ExternalIP", "1.2.3.5"),
                    addr("Hostname", "status-hostname"),
                ],
                preferences: vec![NodeAddressType::Hostname, NodeAddressType::ExternalIP],
                expect_err: "",
                expect_address: "label-hostname",
            },
            Case {
                name: "found label address",
                labels: hostname_label("label-hostname"),
                addresses: vec![addr("ExternalIP", "1.2.3.5")],
                preferences: vec![NodeAddressType::Hostname, NodeAddressType::ExternalIP],
                expect_err: "",
                expect_address: "label-hostname",
            },
            Case {
                name: "label ignored when hostname not preferred",
                labels: hostname_label("label-hostname"),
                addresses: vec![addr("ExternalIP", "1.2.3.5")],
                preferences: vec![NodeAddressType::ExternalIP, NodeAddressType::Hostname],
                expect_err: "",
                expect_address: "1.2.3.5",
            },
            Case {
                name: "empty hostname label falls through to addresses",
                labels: hostname_label(""),
                addresses: vec![addr("Hostname", "node0.internal")],
                preferences: vec![NodeAddressType::Hostname],
                expect_err: "",
                expect_address: "node0.internal",
            },
            Case {
                name: "empty hostname label alone is not an address",
                labels: hostname_label(""),
                addresses: vec![],
                preferences: vec![NodeAddressType::Hostname],
                expect_err: "no preferred addresses found; known addresses: []",
                expect_address: "",
            },
        ];

        for case in cases {
            let node = node_with(case.labels, case.addresses);
            let result = get_preferred_node_address(&node, &case.preferences);

            let (address, err) = match result {
                Ok(a) => (a, String::new()),
                Err(e) => (String::new(), e.to_string()),
            };
            assert_eq!(err, case.expect_err, "{}: unexpected error", case.name);
            assert_eq!(
                address, case.expect_address,
                "{}: unexpected address",
                case.name
            );
        }
    }

    #[test]
    fn test_not_found_lists_every_address_in_order() {
        let addresses = vec![
            addr("InternalIP", "10.0.0.1"),
            addr("InternalDNS", "node0.cluster.local"),
            addr("InternalIP", "10.0.0.2"),
        ];
        let err = resolve_preferred_address(
            &BTreeMap::new(),
            &addresses,
            &[NodeAddressType::ExternalIP, NodeAddressType::ExternalDNS],
        )
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "no preferred addresses found; known addresses: \
             [{InternalIP 10.0.0.1} {InternalDNS node0.cluster.local} {InternalIP 10.0.0.2}]"
        );
    }

    #[test]
    fn test_preference_order_changes_result() {
        let addresses = vec![addr("InternalIP", "10.0.0.1"), addr("ExternalIP", "1.2.3.4")];
        let labels = BTreeMap::new();

        let internal_first = resolve_preferred_address(
            &labels,
            &addresses,
            &[NodeAddressType::InternalIP, NodeAddressType::ExternalIP],
        )
        .unwrap();
        let external_first = resolve_preferred_address(
            &labels,
            &addresses,
            &[NodeAddressType::ExternalIP, NodeAddressType::InternalIP],
        )
        .unwrap();

        assert_eq!(internal_first, "10.0.0.1");
        assert_eq!(external_first, "1.2.3.4");
    }

    #[test]
    fn test_address_order_irrelevant_for_single_matching_type() {
        let labels = BTreeMap::new();
        let forward = vec![addr("InternalIP", "10.0.0.1"), addr("ExternalIP", "1.2.3.4")];
        let reversed: Vec<NodeAddress> = forward.iter().rev().cloned().collect();

        for addresses in [forward, reversed] {
            let resolved =
                resolve_preferred_address(&labels, &addresses, &[NodeAddressType::ExternalIP])
                    .unwrap();
            assert_eq!(resolved, "1.2.3.4");
        }
    }

    #[test]
    fn test_node_without_status_or_labels() {
        let node = Node::default();
        let err = get_preferred_node_address(&node, &[NodeAddressType::InternalIP]).unwrap_err();
        assert!(matches!(err, NodeError::AddressNotFound { .. }));
    }

    #[test]
    fn test_address_type_round_trip_names() {
        for t in [
            NodeAddressType::Hostname,
            NodeAddressType::ExternalIP,
            NodeAddressType::InternalIP,
            NodeAddressType::ExternalDNS,
            NodeAddressType::InternalDNS,
        ] {
            assert_eq!(t.to_string().parse::<NodeAddressType>().unwrap(), t);
        }
        assert!(matches!(
            "LoopbackIP".parse::<NodeAddressType>(),
            Err(NodeError::UnknownAddressType(name)) if name == "LoopbackIP"
        ));
    }

    #[test]
    fn test_parse_preferences_keeps_order() {
        let prefs = parse_preferences("Hostname, InternalIP,,ExternalIP").unwrap();
        assert_eq!(
            prefs,
            vec![
                NodeAddressType::Hostname,
                NodeAddressType::InternalIP,
                NodeAddressType::ExternalIP
            ]
        );
        assert!(parse_preferences("Hostname,Bogus").is_err());
        assert!(parse_preferences("").unwrap().is_empty());
    }

    #[test]
    fn test_get_node_host_ip_prefers_internal() {
        let node = node_with(
            BTreeMap::new(),
            vec![
                addr("ExternalIP", "203.0.113.5"),
                addr("InternalIP", "not-an-ip"),
                addr("InternalIP", "10.1.2.3"),
            ],
        );
        assert_eq!(
            get_node_host_ip(&node).unwrap(),
            "10.1.2.3".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_get_node_host_ip_falls_back_to_external() {
        let node = node_with(
            BTreeMap::new(),
            vec![addr("Hostname", "node0"), addr("ExternalIP", "2001:db8::1")],
        );
        assert_eq!(
            get_node_host_ip(&node).unwrap(),
            "2001:db8::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_get_node_host_ip_unknown() {
        let node = node_with(BTreeMap::new(), vec![addr("Hostname", "node0")]);
        assert_eq!(
            get_node_host_ip(&node).unwrap_err().to_string(),
            "host IP unknown; known addresses: [{Hostname node0}]"
        );
    }

    #[test]
    fn test_zone_key() {
        let topology = node_with(
            BTreeMap::from([
                (LABEL_TOPOLOGY_REGION.to_string(), "region1".to_string()),
                (LABEL_TOPOLOGY_ZONE.to_string(), "zone1".to_string()),
            ]),
            vec![],
        );
        assert_eq!(get_zone_key(&topology), "region1:\x00:zone1");

        let legacy = node_with(
            BTreeMap::from([(LABEL_FAILURE_DOMAIN_ZONE.to_string(), "zone2".to_string())]),
            vec![],
        );
        assert_eq!(get_zone_key(&legacy), ":\x00:zone2");

        assert_eq!(get_zone_key(&node_with(BTreeMap::new(), vec![])), "");
        assert_eq!(get_zone_key(&Node::default()), "");
    }
}
