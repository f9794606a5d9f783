// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `selector.rs`

use super::{matches_selector, parse_selector, Requirement};
use std::collections::BTreeMap;

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn test_parse_selector_terms() {
    let terms = parse_selector("a=1, b==2,c!=3,d,!e,");
    assert_eq!(
        terms,
        vec![
            Requirement::Equals("a".to_string(), "1".to_string()),
            Requirement::Equals("b".to_string(), "2".to_string()),
            Requirement::NotEquals("c".to_string(), "3".to_string()),
            Requirement::Exists("d".to_string()),
            Requirement::DoesNotExist("e".to_string()),
        ]
    );
}

#[test]
fn test_empty_selector_matches_everything() {
    assert!(matches_selector("", &BTreeMap::new()));
    assert!(matches_selector("", &labels(&[("zone", "a")])));
}

#[test]
fn test_equality_terms() {
    let node_labels = labels(&[("zone", "a"), ("role", "worker")]);

    assert!(matches_selector("zone=a", &node_labels));
    assert!(matches_selector("zone==a,role=worker", &node_labels));
    assert!(!matches_selector("zone=b", &node_labels));
    assert!(!matches_selector("zone=a,role=master", &node_labels));
}

#[test]
fn test_inequality_matches_absent_label() {
    let node_labels = labels(&[("zone", "a")]);

    assert!(matches_selector("role!=master", &node_labels));
    assert!(!matches_selector("zone!=a", &node_labels));
}

#[test]
fn test_existence_terms() {
    let node_labels = labels(&[("node-role.kubernetes.io/control-plane", "")]);

    assert!(matches_selector(
        "node-role.kubernetes.io/control-plane",
        &node_labels
    ));
    assert!(!matches_selector(
        "!node-role.kubernetes.io/control-plane",
        &node_labels
    ));
    assert!(matches_selector("!gpu", &node_labels));
}
