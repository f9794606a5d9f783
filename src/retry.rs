// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff for node store operations.
//!
//! [`patch_node_status`](crate::patch::patch_node_status) and the store methods never
//! retry on their own. Callers that want to ride out optimistic-concurrency conflicts
//! or a flapping API server wrap the call in [`retry_on_conflict`], which retries
//! errors for which [`NodeError::is_retryable`] is true and fails fast on the rest.

use crate::errors::NodeError;
use crate::metrics;
use crate::store::StoreOperation;
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Maximum total time to spend retrying (2 minutes)
const MAX_ELAPSED_TIME_SECS: u64 = 120;

/// Initial retry interval (100ms)
const INITIAL_INTERVAL_MILLIS: u64 = 100;

/// Maximum interval between retries (10 seconds)
const MAX_INTERVAL_SECS: u64 = 10;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with randomization (jitter) to prevent thundering herd.
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Initial interval duration
    pub initial_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Maximum total elapsed time
    pub max_elapsed_time: Option<Duration>,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    /// Start time for tracking total elapsed time
    start_time: Instant,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with specified parameters.
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Get the next backoff interval, or None if max elapsed time exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    /// Restart the schedule from the initial interval.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.start_time = Instant::now();
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let jittered = rand::rng().random_range(min..=max);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Create default exponential backoff configuration for node store retries.
///
/// # Configuration
///
/// - **Initial interval**: 100ms
/// - **Max interval**: 10 seconds
/// - **Max elapsed time**: 2 minutes total
/// - **Multiplier**: 2.0 (exponential growth)
/// - **Randomization**: ±10% (prevents thundering herd)
///
/// # Retry Schedule
///
/// With these settings, retries occur at approximately:
///
/// 1. 100ms
/// 2. 200ms
/// 3. 400ms
/// 4. 800ms
/// 5. 1.6s
/// 6. 3.2s
/// 7. 6.4s
/// 8. 10s (capped at max interval)
///    9-. 10s intervals until 2 minutes elapsed
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(MAX_INTERVAL_SECS),
        Some(Duration::from_secs(MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Retry a node operation with the [`default_backoff`] schedule.
///
/// See [`retry_with_backoff`].
///
/// # Errors
///
/// Returns the last error when it is not retryable or the backoff is exhausted.
pub async fn retry_on_conflict<T, F, Fut>(
    operation: F,
    kind: StoreOperation,
    node_name: &str,
) -> Result<T, NodeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NodeError>>,
{
    retry_with_backoff(default_backoff(), operation, kind, node_name).await
}

/// Retry a node operation while it fails with a retryable error.
///
/// The closure is re-invoked on every attempt, so it should re-read whatever state
/// the write is based on (for example `get` the node again before patching).
///
/// # Arguments
///
/// * `backoff` - Retry schedule
/// * `operation` - Async function that performs the store call
/// * `kind` - Store operation being retried; the `operation` metric label
/// * `node_name` - Node the operation targets; logged, never used as a label
///
/// # Errors
///
/// Returns the error unchanged if it is not retryable, or the last error once the
/// backoff schedule is exhausted.
///
/// # Example
///
/// ```rust,no_run
/// use nodeutil::patch::patch_node_status;
/// use nodeutil::retry::retry_on_conflict;
/// use nodeutil::store::{NodeStore, StoreOperation};
///
/// # async fn example(store: &dyn NodeStore) -> Result<(), nodeutil::errors::NodeError> {
/// retry_on_conflict(
///     || async {
///         let old = store.get("node-a").await?;
///         let mut new = old.clone();
///         new.status.get_or_insert_with(Default::default).phase = Some("Running".into());
///         patch_node_status(store, "node-a", &old, &new).await
///     },
///     StoreOperation::PatchStatus,
///     "node-a",
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<T, F, Fut>(
    mut backoff: ExponentialBackoff,
    mut operation: F,
    kind: StoreOperation,
    node_name: &str,
) -> Result<T, NodeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NodeError>>,
{
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = %kind,
                        node = node_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Node operation succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !e.is_retryable() {
                    debug!(
                        operation = %kind,
                        node = node_name,
                        error = %e,
                        "Non-retryable node error, failing immediately"
                    );
                    return Err(e);
                }

                if let Some(duration) = backoff.next_backoff() {
                    warn!(
                        operation = %kind,
                        node = node_name,
                        attempt = attempt,
                        retry_after = ?duration,
                        error = %e,
                        "Retryable node error, will retry"
                    );
                    metrics::record_retry(kind);
                    tokio::time::sleep(duration).await;
                } else {
                    error!(
                        operation = %kind,
                        node = node_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Backoff exhausted, giving up"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
