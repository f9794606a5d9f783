// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Well-known node label keys.
//!
//! These are the labels the kubelet and cloud providers put on `Node` objects
//! and that the address resolver and zone helpers read.

// ============================================================================
// Kubernetes Well-Known Node Labels
// https://kubernetes.io/docs/reference/labels-annotations-taints/
// ============================================================================

/// Hostname label set by the kubelet; overrides any `Hostname` status address
pub const LABEL_HOSTNAME: &str = "kubernetes.io/hostname";

/// Topology zone label (GA form)
pub const LABEL_TOPOLOGY_ZONE: &str = "topology.kubernetes.io/zone";

/// Topology region label (GA form)
pub const LABEL_TOPOLOGY_REGION: &str = "topology.kubernetes.io/region";

/// Legacy failure-domain zone label, still set by older cloud providers
pub const LABEL_FAILURE_DOMAIN_ZONE: &str = "failure-domain.beta.kubernetes.io/zone";

/// Legacy failure-domain region label, still set by older cloud providers
pub const LABEL_FAILURE_DOMAIN_REGION: &str = "failure-domain.beta.kubernetes.io/region";

