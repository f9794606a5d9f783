// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for nodeutil.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Node Address Type Names
// ============================================================================

/// Address type for the node's hostname
pub const ADDRESS_TYPE_HOSTNAME: &str = "Hostname";

/// Address type for an externally routable IP
pub const ADDRESS_TYPE_EXTERNAL_IP: &str = "ExternalIP";

/// Address type for a cluster-internal IP
pub const ADDRESS_TYPE_INTERNAL_IP: &str = "InternalIP";

/// Address type for an externally resolvable DNS name
pub const ADDRESS_TYPE_EXTERNAL_DNS: &str = "ExternalDNS";

/// Address type for a cluster-internal DNS name
pub const ADDRESS_TYPE_INTERNAL_DNS: &str = "InternalDNS";

/// Default address preference order used by the reporter binary
pub const DEFAULT_PREFERRED_ADDRESS_TYPES: &str = "Hostname,InternalIP,ExternalIP";

// ============================================================================
// Zone Key Constants
// ============================================================================

/// Separator between region and zone in a zone key
///
/// Contains a NUL byte so it cannot collide with any valid label value.
pub const ZONE_KEY_SEPARATOR: &str = ":\x00:";

// ============================================================================
// Event Constants
// ============================================================================

/// Namespace events land in when the involved object is cluster-scoped
pub const DEFAULT_EVENT_NAMESPACE: &str = "default";

/// Source component stamped on events by the in-memory recorder
pub const FAKE_RECORDER_COMPONENT: &str = "nodeControllerTest";

/// Default reporting controller name for published events
pub const DEFAULT_CONTROLLER_NAME: &str = "nodeutil-controller";

// ============================================================================
// Controller Constants
// ============================================================================

/// Requeue duration after a successful node reconciliation (5 minutes)
pub const DEFAULT_REQUEUE_SECS: u64 = 300;

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Capacity of the fake store's watch broadcast channel
pub const WATCH_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
