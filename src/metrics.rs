// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for nodeutil.
//!
//! All metrics carry the namespace prefix `nodeutil_`.
//!
//! # Metrics Categories
//!
//! - **Address Metrics** - Outcomes of preferred-address resolution
//! - **Status Patch Metrics** - Applied, skipped and failed node status patches
//! - **Reconciliation Metrics** - Node reconciliations run by the reporter binary
//! - **Retry Metrics** - Retries of conflicting or transient store operations
//!
//! # Example
//!
//! ```rust,no_run
//! use nodeutil::metrics::{gather_metrics, record_status_patch};
//!
//! record_status_patch("applied", std::time::Duration::from_millis(12));
//! let text = gather_metrics().unwrap();
//! ```

use crate::store::StoreOperation;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all nodeutil metrics
const METRICS_NAMESPACE: &str = "nodeutil";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Address Metrics
// ============================================================================

/// Total number of preferred-address resolutions by outcome
///
/// Labels:
/// - `outcome`: `resolved` or `not_found`
pub static ADDRESS_RESOLUTIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_address_resolutions_total"),
        "Total number of preferred node address resolutions by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Status Patch Metrics
// ============================================================================

/// Total number of node status patches by outcome
///
/// Labels:
/// - `outcome`: `applied`, `skipped` (no diff) or `failed`
pub static STATUS_PATCHES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_status_patches_total"),
        "Total number of node status patches by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of node status patch operations in seconds
///
/// Labels:
/// - `outcome`: `applied`, `skipped` or `failed`
pub static STATUS_PATCH_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_status_patch_duration_seconds"),
        "Duration of node status patch operations in seconds by outcome",
    )
    .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]);
    let histogram = HistogramVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of node reconciliations by status
///
/// Labels:
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of node reconciliations by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of node reconciliations in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of node reconciliations in seconds",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Retry Metrics
// ============================================================================

/// Total number of retried store operations
///
/// Labels:
/// - `operation`: Store operation being retried, e.g. `patch_status`
pub static RETRIES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_retries_total"),
        "Total number of retried node store operations",
    );
    let counter = CounterVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record the outcome of a preferred-address resolution
///
/// # Arguments
/// * `outcome` - `resolved` or `not_found`
pub fn record_address_resolution(outcome: &str) {
    ADDRESS_RESOLUTIONS_TOTAL
        .with_label_values(&[outcome])
        .inc();
}

/// Record a node status patch
///
/// # Arguments
/// * `outcome` - `applied`, `skipped` or `failed`
/// * `duration` - Time spent diffing and submitting the patch
pub fn record_status_patch(outcome: &str, duration: Duration) {
    STATUS_PATCHES_TOTAL.with_label_values(&[outcome]).inc();
    STATUS_PATCH_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

/// Record a finished node reconciliation
///
/// # Arguments
/// * `status` - `success` or `error`
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation(status: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[status]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration.as_secs_f64());
}

/// Record a retry of a store operation
pub fn record_retry(operation: StoreOperation) {
    RETRIES_TOTAL.with_label_values(&[operation.as_str()]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Returns
/// Prometheus-formatted metrics as a String
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
