// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Equality-based label selector matching.
//!
//! The API server evaluates selectors for [`KubeNodeStore`](crate::store::KubeNodeStore);
//! the in-memory fake store evaluates them locally with this module so that tests see
//! the same filtering.
//!
//! Supported terms, comma-separated and ANDed together:
//!
//! | Term      | Matches when                       |
//! |-----------|------------------------------------|
//! | `k=v`     | label `k` exists with value `v`    |
//! | `k==v`    | same as `k=v`                      |
//! | `k!=v`    | label `k` is absent or not `v`     |
//! | `k`       | label `k` exists                   |
//! | `!k`      | label `k` is absent                |
//!
//! # Example
//!
//! ```rust
//! use nodeutil::selector::matches_selector;
//! use std::collections::BTreeMap;
//!
//! let labels = BTreeMap::from([("zone".to_string(), "a".to_string())]);
//! assert!(matches_selector("zone=a", &labels));
//! assert!(!matches_selector("zone!=a", &labels));
//! ```

use std::collections::BTreeMap;

/// One parsed selector term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// `k=v` / `k==v`
    Equals(String, String),
    /// `k!=v`
    NotEquals(String, String),
    /// `k`
    Exists(String),
    /// `!k`
    DoesNotExist(String),
}

impl Requirement {
    /// Returns true if `labels` satisfy this term.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Equals(k, v) => labels.get(k) == Some(v),
            Self::NotEquals(k, v) => labels.get(k) != Some(v),
            Self::Exists(k) => labels.contains_key(k),
            Self::DoesNotExist(k) => !labels.contains_key(k),
        }
    }
}

/// Parse a selector string into its terms. Blank terms are ignored.
#[must_use]
pub fn parse_selector(selector: &str) -> Vec<Requirement> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            if let Some((k, v)) = term.split_once("!=") {
                Requirement::NotEquals(k.trim().to_string(), v.trim().to_string())
            } else if let Some((k, v)) = term.split_once("==") {
                Requirement::Equals(k.trim().to_string(), v.trim().to_string())
            } else if let Some((k, v)) = term.split_once('=') {
                Requirement::Equals(k.trim().to_string(), v.trim().to_string())
            } else if let Some(k) = term.strip_prefix('!') {
                Requirement::DoesNotExist(k.trim().to_string())
            } else {
                Requirement::Exists(term.to_string())
            }
        })
        .collect()
}

/// Returns true if `labels` satisfy every term of `selector`.
///
/// An empty selector matches everything.
#[must_use]
pub fn matches_selector(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    parse_selector(selector).iter().all(|r| r.matches(labels))
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
