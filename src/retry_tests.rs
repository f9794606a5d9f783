// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::{default_backoff, retry_with_backoff, ExponentialBackoff};
    use crate::errors::{NodeError, StoreError};
    use crate::patch::patch_node_status;
    use crate::metrics::RETRIES_TOTAL;
    use crate::store::{NodeStore, StoreOperation};
    use crate::testutil::{new_node, FakeNodeStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// A fast schedule with no jitter.
    fn fast_backoff(max_elapsed: Option<Duration>) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(4),
            max_elapsed,
            2.0,
            0.0,
        )
    }

    /// Test that backoff configuration has expected values
    #[test]
    fn test_backoff_configuration() {
        let backoff = default_backoff();

        assert_eq!(backoff.initial_interval, Duration::from_millis(100));
        assert_eq!(backoff.max_interval, Duration::from_secs(10));
        assert_eq!(backoff.max_elapsed_time, Some(Duration::from_secs(120)));

        #[allow(clippy::float_cmp)]
        {
            assert_eq!(backoff.multiplier, 2.0);
            assert_eq!(backoff.randomization_factor, 0.1);
        }
    }

    /// Test that intervals double and then stay at the cap
    #[test]
    fn test_backoff_timing_progression() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(500),
            None,
            2.0,
            0.0,
        );

        let intervals: Vec<Duration> = (0..5).filter_map(|_| backoff.next_backoff()).collect();
        assert_eq!(
            intervals,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut backoff = default_backoff();
        let first = backoff.next_backoff().unwrap();

        assert!(first >= Duration::from_millis(90), "got {first:?}");
        assert!(first <= Duration::from_millis(110), "got {first:?}");
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = fast_backoff(None);
        backoff.next_backoff();
        backoff.next_backoff();
        assert_eq!(backoff.current_interval, Duration::from_millis(4));

        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1)));
    }

    /// Test that the schedule ends once the elapsed budget is spent
    #[test]
    fn test_max_elapsed_time() {
        let mut backoff = fast_backoff(Some(Duration::ZERO));
        assert_eq!(backoff.next_backoff(), None);
    }

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let attempts = AtomicUsize::new(0);

        let result = retry_with_backoff(
            fast_backoff(None),
            || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(NodeError::Store(StoreError::Conflict {
                        name: "node0".to_string(),
                        message: "stale".to_string(),
                    }))
                } else {
                    Ok(attempt)
                }
            },
            StoreOperation::Get,
            "node0",
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let attempts = AtomicUsize::new(0);

        let result: Result<(), NodeError> = retry_with_backoff(
            fast_backoff(None),
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::Store(StoreError::NotFound {
                    name: "node0".to_string(),
                }))
            },
            StoreOperation::Get,
            "node0",
        )
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_backoff_returns_last_error() {
        let attempts = AtomicUsize::new(0);

        let result: Result<(), NodeError> = retry_with_backoff(
            fast_backoff(Some(Duration::ZERO)),
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::Store(StoreError::Unavailable(
                    "connection refused".to_string(),
                )))
            },
            StoreOperation::Get,
            "node0",
        )
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    /// A stale snapshot conflicts once; the retry re-reads and succeeds.
    #[tokio::test]
    async fn test_rereads_after_resource_version_conflict() {
        let store = FakeNodeStore::new(vec![new_node("node0")]);
        let stale = store.get("node0").await.unwrap();

        // Someone else writes first, bumping the resource version.
        store.update(&stale).await.unwrap();

        let first_attempt = AtomicUsize::new(0);
        let result = retry_with_backoff(
            fast_backoff(None),
            || async {
                let old = if first_attempt.fetch_add(1, Ordering::SeqCst) == 0 {
                    stale.clone()
                } else {
                    store.get("node0").await?
                };
                // Carry the snapshot's version as a precondition.
                let patch = serde_json::to_vec(&serde_json::json!({
                    "metadata": { "resourceVersion": old.metadata.resource_version },
                    "status": { "phase": "Running" }
                }))?;
                Ok::<_, NodeError>(store.patch_status("node0", &patch).await?)
            },
            StoreOperation::PatchStatus,
            "node0",
        )
        .await
        .unwrap();

        assert_eq!(first_attempt.load(Ordering::SeqCst), 2);
        assert_eq!(result.status.unwrap().phase.as_deref(), Some("Running"));

        // The unconditional path goes through on the first try.
        let current = store.get("node0").await.unwrap();
        let mut next = current.clone();
        next.status.get_or_insert_with(Default::default).phase = Some("Succeeded".to_string());
        let patched = retry_with_backoff(
            fast_backoff(None),
            || patch_node_status(&store, "node0", &current, &next),
            StoreOperation::PatchStatus,
            "node0",
        )
        .await
        .unwrap();
        assert_eq!(patched.status.unwrap().phase.as_deref(), Some("Succeeded"));
    }

    #[tokio::test]
    async fn test_retry_metric_label_is_the_operation() {
        let counter = RETRIES_TOTAL.with_label_values(&["update_status"]);
        let before = counter.get();
        let attempts = AtomicUsize::new(0);

        retry_with_backoff(
            fast_backoff(None),
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(NodeError::Store(StoreError::Unavailable("reset".to_string())))
                } else {
                    Ok(())
                }
            },
            StoreOperation::UpdateStatus,
            "node-with-a-unique-name-42",
        )
        .await
        .unwrap();

        assert!(counter.get() >= before + 1.0);
        let exposed = crate::metrics::gather_metrics().unwrap();
        assert!(exposed.contains("operation=\"update_status\""));
        assert!(!exposed.contains("node-with-a-unique-name-42"));
    }
}
